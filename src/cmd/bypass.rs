//! BYPASS-based discovery: shift a pattern through the chain and see it
//! come back `device_count` cycles later.

use std::io::Write;

use anyhow::Result;
use bitvec::prelude::*;
use itertools::Itertools;

use crate::gpio::Level;
use crate::probe::{
    bits_from_str, bits_to_string, JtagEngine, PinRoles, IGNORE_PIN, MAX_DEV_NR, PATTERN,
};

use super::{close_report, open_report, KnownPins, PinTable, ScanOptions};

/// Brute-force (TCK, TMS, TDO, TDI) over the pin table, confirming hits
/// with the BYPASS pattern.
#[derive(Debug, clap::Parser)]
pub struct ScanCmd {
    #[clap(flatten)]
    scan: ScanOptions,

    /// JSON object mapping pin labels to GPIO numbers.
    #[clap(long, value_parser = super::parse_pin_map)]
    pins: PinTable,
}

impl ScanCmd {
    pub fn run(self, w: &mut dyn Write) -> Result<()> {
        let mut engine = self.scan.attach()?;
        engine.set_pins(self.pins.0);
        scan_bypass(&mut engine, w)?;
        engine.close()?;
        Ok(())
    }
}

/// Verify a known pin assignment by shifting the pattern through BYPASS.
#[derive(Debug, clap::Parser)]
pub struct TestCmd {
    #[clap(flatten)]
    scan: ScanOptions,

    /// JSON object with tdi/tdo/tck/tms and optionally trst GPIO numbers.
    #[clap(long, value_parser = super::parse_known_pins)]
    known_pins: KnownPins,
}

impl TestCmd {
    pub fn run(self, w: &mut dyn Write) -> Result<()> {
        let mut engine = self.scan.attach()?;
        engine.set_roles(self.known_pins.roles);
        engine.set_pins(self.known_pins.pins);
        test_bypass(&mut engine, w)?;
        engine.close()?;
        Ok(())
    }
}

/// Walk every ordered 4-tuple of distinct pins as (TCK, TMS, TDO, TDI).
/// A permutation counts as found when the chain answers with a plausible
/// device count and the pattern survives the round trip; the remaining
/// pins are then probed as nTRST candidates.
pub fn scan_bypass(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    open_report(w, "bypass scan")?;

    let pattern = bits_from_str(PATTERN);
    let pins = engine.pins().to_vec();

    for perm in pins.iter().permutations(4) {
        let (tck, tms, tdo, tdi) = (perm[0], perm[1], perm[2], perm[3]);
        tracing::debug!(
            "bypass scan tck:{} tms:{} tdo:{} tdi:{}",
            tck.label,
            tms.label,
            tdo.label,
            tdi.label
        );
        engine.set_roles(PinRoles {
            tck: tck.pin,
            tms: tms.pin,
            tdo: tdo.pin,
            tdi: tdi.pin,
            trst: IGNORE_PIN,
        });
        engine.init_pins()?;

        let devices = engine.detect_devices()?;
        if devices == 0 || devices > MAX_DEV_NR {
            continue;
        }

        let (matched, received) = pattern_through_bypass(engine, devices, &pattern)?;
        if matched {
            writeln!(
                w,
                "FOUND! tck:{} tms:{} tdo:{} tdi:{} devices:{}",
                tck.label, tms.label, tdo.label, tdi.label, devices
            )?;
            probe_trst_by_count(engine, devices, w)?;
        } else if !all_equal(&received) {
            writeln!(
                w,
                "active, tck:{} tms:{} tdo:{} tdi:{} received: {}",
                tck.label,
                tms.label,
                tdo.label,
                tdi.label,
                bits_to_string(&received)
            )?;
        }
    }

    close_report(w)
}

/// One-shot bypass verification over fixed roles.
pub fn test_bypass(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    open_report(w, "bypass test")?;

    engine.init_pins()?;
    let devices = engine.detect_devices()?;
    writeln!(w, "detected {devices} device(s)")?;

    if devices == 0 || devices > MAX_DEV_NR {
        writeln!(w, "nothing to test")?;
        return close_report(w);
    }

    let pattern = bits_from_str(PATTERN);
    let (matched, received) = pattern_through_bypass(engine, devices, &pattern)?;
    if matched {
        writeln!(w, "match!")?;
    } else {
        writeln!(w, "no match, received: {}", bits_to_string(&received))?;
    }

    close_report(w)
}

/// The chain is already in BYPASS after a device count; push the pattern
/// plus one padding zero per device through the DR and compare against the
/// capture offset by the chain length.
fn pattern_through_bypass(
    engine: &mut JtagEngine,
    devices: usize,
    pattern: &BitSlice<u8>,
) -> Result<(bool, BitVec<u8>)> {
    let mut tx: BitVec<u8> = pattern.to_bitvec();
    tx.extend(std::iter::repeat(false).take(devices));
    let received = engine.send_data(&tx)?;
    let matched = received[devices..] == *pattern;
    Ok((matched, received))
}

/// With the winning roles fixed, pull every remaining pin low for the
/// reset hold time and watch whether the device count changes.
fn probe_trst_by_count(
    engine: &mut JtagEngine,
    devices: usize,
    w: &mut dyn Write,
) -> Result<()> {
    let roles = engine.roles();
    for candidate in engine.pins().to_vec() {
        if roles.claims(candidate.pin) {
            continue;
        }
        engine.init_pins()?;
        engine.write_pin(candidate.pin, Level::Low)?;
        engine.wait_reset();
        if engine.detect_devices()? != devices {
            writeln!(w, "possible nTRST: {}", candidate.label)?;
        }
    }
    // Leave no candidate asserted.
    engine.init_pins()?;
    Ok(())
}

fn all_equal(bits: &BitSlice<u8>) -> bool {
    bits.first().map_or(true, |first| {
        let first = *first;
        bits.iter().by_vals().all(|b| b == first)
    })
}
