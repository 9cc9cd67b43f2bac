//! IDCODE-based discovery and verification.

use std::io::Write;

use anyhow::Result;
use itertools::Itertools;

use crate::gpio::Level;
use crate::probe::{IdCode, JtagEngine, PinRoles, IGNORE_PIN, MAX_DEV_NR};

use super::{close_report, open_report, KnownPins, PinTable, ScanOptions};

/// Brute-force (TCK, TMS, TDO) over the pin table, looking for a valid
/// IDCODE straight after reset. TDI stays out of the game: the
/// identification register needs nothing shifted in.
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
        scan_idcode(&mut engine, w)?;
        engine.close()?;
        Ok(())
    }
}

/// Read and print the IDCODEs behind a known pin assignment.
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
        test_idcode(&mut engine, w)?;
        engine.close()?;
        Ok(())
    }
}

/// Walk every ordered 3-tuple of distinct pins as (TCK, TMS, TDO).
pub fn scan_idcode(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    open_report(w, "idcode scan")?;

    let pins = engine.pins().to_vec();
    for perm in pins.iter().permutations(3) {
        let (tck, tms, tdo) = (perm[0], perm[1], perm[2]);
        tracing::debug!("idcode scan tck:{} tms:{} tdo:{}", tck.label, tms.label, tdo.label);
        engine.set_roles(PinRoles {
            tck: tck.pin,
            tms: tms.pin,
            tdo: tdo.pin,
            tdi: IGNORE_PIN,
            trst: IGNORE_PIN,
        });
        engine.init_pins()?;

        let first = match engine.read_idcodes(1)?.first().copied() {
            Some(code) => code,
            None => continue,
        };
        if !first.valid() {
            continue;
        }

        writeln!(
            w,
            "FOUND! tck:{} tms:{} tdo:{}",
            tck.label, tms.label, tdo.label
        )?;
        let codes = engine.read_idcodes(MAX_DEV_NR)?;
        print_idcodes(w, &codes)?;
        probe_trst_by_idcode(engine, w)?;
    }

    close_report(w)
}

/// One-shot IDCODE readout over fixed roles.
pub fn test_idcode(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    open_report(w, "idcode test")?;

    engine.init_pins()?;
    let codes = engine.read_idcodes(MAX_DEV_NR)?;
    if codes.iter().any(|c| c.valid()) {
        print_idcodes(w, &codes)?;
    } else {
        writeln!(w, "no idcode found")?;
    }

    close_report(w)
}

/// Print every valid IDCODE, one per line. Positions reading back as all
/// ones or with a clear LSB hold no device and stay silent.
fn print_idcodes(w: &mut dyn Write, codes: &[IdCode]) -> Result<()> {
    for code in codes.iter().filter(|c| c.valid()) {
        writeln!(w, "  {code}")?;
    }
    Ok(())
}

/// Pull every pin outside the winning roles low and compare a freshly
/// read first IDCODE before and after.
fn probe_trst_by_idcode(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    let roles = engine.roles();
    for candidate in engine.pins().to_vec() {
        if roles.claims(candidate.pin) {
            continue;
        }
        engine.init_pins()?;
        let before = engine.read_idcodes(1)?.first().copied();
        engine.write_pin(candidate.pin, Level::Low)?;
        engine.wait_reset();
        let after = engine.read_idcodes(1)?.first().copied();
        if before != after {
            writeln!(w, "possible nTRST: {}", candidate.label)?;
        }
    }
    engine.init_pins()?;
    Ok(())
}
