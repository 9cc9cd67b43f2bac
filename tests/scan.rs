//! End-to-end scenarios: the discovery commands run against the software
//! TAP model exactly as they would against wired-up hardware.

use pretty_assertions::assert_eq;

use jtagscan::cmd::{boundary, bypass, idcode, loopback, opcode};
use jtagscan::probe::fake_tap::{FakeDevice, FakeTap, Wiring};
use jtagscan::probe::{JtagEngine, PinRoles, ScanConfig, IGNORE_PIN};
use jtagscan::NamedPin;

fn fast_config() -> ScanConfig {
    ScanConfig {
        delay_tck: 0,
        delay_reset: 0,
        pullup: false,
        dr_scan_via_ir: false,
    }
}

fn engine_with_pins(tap: &FakeTap, pins: &[(&str, u8)]) -> JtagEngine {
    let mut engine = JtagEngine::new(Box::new(tap.clone()), fast_config());
    engine.set_pins(
        pins.iter()
            .map(|(label, pin)| NamedPin {
                label: label.to_string(),
                pin: *pin,
            })
            .collect(),
    );
    engine
}

fn engine_with_known_pins(tap: &FakeTap, roles: PinRoles) -> JtagEngine {
    let mut engine = JtagEngine::new(Box::new(tap.clone()), fast_config());
    engine.set_roles(roles);
    let named = [
        ("tck", roles.tck),
        ("tms", roles.tms),
        ("tdi", roles.tdi),
        ("tdo", roles.tdo),
        ("trst", roles.trst),
    ];
    engine.set_pins(
        named
            .into_iter()
            .filter(|&(_, pin)| pin != IGNORE_PIN)
            .map(|(label, pin)| NamedPin {
                label: label.to_string(),
                pin,
            })
            .collect(),
    );
    engine
}

fn run<F>(engine: &mut JtagEngine, f: F) -> String
where
    F: FnOnce(&mut JtagEngine, &mut dyn std::io::Write) -> anyhow::Result<()>,
{
    let mut out = Vec::new();
    f(engine, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn idcode_scan_finds_the_pinout_and_names_the_vendor() {
    let tap = FakeTap::new(
        Wiring {
            tck: 2,
            tms: 4,
            tdo: 5,
            tdi: 1,
            trst: None,
        },
        vec![FakeDevice::with_idcode(5, 0x0684_617F)],
    );
    let mut engine = engine_with_pins(
        &tap,
        &[("blue", 1), ("green", 2), ("red", 3), ("white", 4), ("yellow", 5)],
    );

    let report = run(&mut engine, idcode::scan_idcode);

    let found: Vec<&str> = report.lines().filter(|l| l.starts_with("FOUND!")).collect();
    assert_eq!(found, vec!["FOUND! tck:green tms:white tdo:yellow"]);
    // Positions past the single device read back all ones and are dropped
    // by the validity filter, so exactly one device line shows up.
    let devices: Vec<&str> = report
        .lines()
        .filter(|l| l.trim_start().starts_with("0x"))
        .collect();
    assert_eq!(
        devices,
        vec!["  0x0684617f (mfg: 0x0bf (Broadcom), part: 0x6846, ver: 0x0)"]
    );
    assert!(!report.contains("possible nTRST"));
}

#[test]
fn loopback_reports_a_short_exactly_once() {
    let tap = FakeTap::disconnected().with_short(3, 4);
    let mut engine = engine_with_pins(
        &tap,
        &[("lbl1", 1), ("lbl2", 2), ("lbl3", 3), ("lbl4", 4), ("lbl5", 5)],
    );

    let report = run(&mut engine, loopback::check_loopback);

    let shorts: Vec<&str> = report
        .lines()
        .filter(|l| l.starts_with("possible short"))
        .collect();
    assert_eq!(shorts, vec!["possible short detected between lbl3 and lbl4"]);
    assert!(!report.contains("interconnection"));
}

#[test]
fn loopback_flags_a_noisy_line() {
    let tap = FakeTap::disconnected().with_noise(2);
    let mut engine = engine_with_pins(&tap, &[("a", 1), ("b", 2), ("c", 3)]);

    let report = run(&mut engine, loopback::check_loopback);

    // The noisy line wobbles whenever it is sampled as TDO, for any TDI.
    assert!(report.contains("possible interconnection or cable noise between b and a"));
    assert!(!report.contains("possible short"));
}

#[test]
fn bypass_test_matches_through_three_devices() {
    let tap = FakeTap::new(
        Wiring {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: Some(8),
        },
        vec![
            FakeDevice::bypass_only(4),
            FakeDevice::bypass_only(5),
            FakeDevice::bypass_only(6),
        ],
    );
    let mut engine = engine_with_known_pins(
        &tap,
        PinRoles {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: 8,
        },
    );

    let report = run(&mut engine, bypass::test_bypass);

    assert!(report.contains("detected 3 device(s)"));
    assert!(report.contains("match!"));
}

#[test]
fn opcode_discovery_reports_only_the_idcode_register() {
    let tap = FakeTap::new(
        Wiring {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: None,
        },
        vec![FakeDevice::with_idcode(5, 0x0684_617F)],
    );
    let mut engine = engine_with_known_pins(
        &tap,
        PinRoles {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: IGNORE_PIN,
        },
    );

    let report = run(&mut engine, opcode::discover_opcode);

    // Exactly one line besides the banners and headline: the IDCODE opcode.
    assert_eq!(
        report.lines().collect::<Vec<&str>>(),
        vec![
            "================================",
            "opcode discovery",
            "opcode 0x1 selects a 32-bit DR",
            "================================",
        ]
    );
}

#[test]
fn boundary_scan_prints_2000_formatted_samples() {
    let tap = FakeTap::new(
        Wiring {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: None,
        },
        vec![FakeDevice::bypass_only(4)],
    );
    let mut engine = engine_with_known_pins(
        &tap,
        PinRoles {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: IGNORE_PIN,
        },
    );

    let report = run(&mut engine, boundary::boundary_scan);

    let sample_lines: Vec<&str> = report
        .lines()
        .filter(|l| !l.is_empty() && l.chars().all(|c| c == '0' || c == '1' || c == ' '))
        .collect();
    let bits: usize = sample_lines
        .iter()
        .map(|l| l.chars().filter(|&c| c != ' ').count())
        .sum();
    assert_eq!(bits, 2000);
    assert_eq!(sample_lines.len(), 16);
    // 128 bits in four 32-bit groups per full line, 80 bits on the last.
    for line in &sample_lines[..15] {
        assert_eq!(line.len(), 131);
    }
    assert_eq!(sample_lines[15].len(), 82);
}

#[test]
fn bypass_scan_finds_the_tuple_and_the_reset_line() {
    let tap = FakeTap::new(
        Wiring {
            tck: 1,
            tms: 2,
            tdo: 3,
            tdi: 4,
            trst: Some(5),
        },
        vec![FakeDevice::bypass_only(4)],
    );
    let mut engine = engine_with_pins(
        &tap,
        &[("p1", 1), ("p2", 2), ("p3", 3), ("p4", 4), ("p5", 5)],
    );

    let report = run(&mut engine, bypass::scan_bypass);

    let found: Vec<&str> = report.lines().filter(|l| l.starts_with("FOUND!")).collect();
    assert_eq!(found, vec!["FOUND! tck:p1 tms:p2 tdo:p3 tdi:p4 devices:1"]);
    assert!(report.contains("possible nTRST: p5"));
}

#[test]
fn bypass_scan_examines_every_ordered_four_tuple() {
    let tap = FakeTap::disconnected();
    let mut engine = engine_with_pins(
        &tap,
        &[("p1", 1), ("p2", 2), ("p3", 3), ("p4", 4), ("p5", 5)],
    );

    let report = run(&mut engine, bypass::scan_bypass);

    // Every permutation initializes its pins once, turning TDO around.
    assert_eq!(tap.input_requests(), 5 * 4 * 3 * 2);
    assert!(!report.contains("FOUND!"));
}

#[test]
fn idcode_scan_examines_every_ordered_three_tuple() {
    let tap = FakeTap::disconnected();
    let mut engine = engine_with_pins(&tap, &[("p1", 1), ("p2", 2), ("p3", 3), ("p4", 4)]);

    let report = run(&mut engine, idcode::scan_idcode);

    assert_eq!(tap.input_requests(), 4 * 3 * 2);
    assert!(!report.contains("FOUND!"));
}
