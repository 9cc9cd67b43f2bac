//! Brute-force IR opcode discovery.

use std::io::Write;

use anyhow::Result;

use crate::probe::JtagEngine;

use super::{close_report, open_report, KnownPins, ScanOptions};

/// Enumerate IR opcodes on a single-device chain and report those that
/// select a data register wider than BYPASS.
#[derive(Debug, clap::Parser)]
pub struct Cmd {
    #[clap(flatten)]
    scan: ScanOptions,

    /// JSON object with tdi/tdo/tck/tms and optionally trst GPIO numbers.
    #[clap(long, value_parser = super::parse_known_pins)]
    known_pins: KnownPins,
}

impl Cmd {
    pub fn run(self, w: &mut dyn Write) -> Result<()> {
        let mut engine = self.scan.attach()?;
        engine.set_roles(self.known_pins.roles);
        engine.set_pins(self.known_pins.pins);
        discover_opcode(&mut engine, w)?;
        engine.close()?;
        Ok(())
    }
}

/// Measure the DR behind every opcode of a single device. A 1-bit DR is
/// BYPASS or equivalent and stays silent; anything wider is worth a line.
pub fn discover_opcode(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    open_report(w, "opcode discovery")?;

    engine.init_pins()?;
    let devices = engine.detect_devices()?;
    if devices != 1 {
        writeln!(w, "need exactly one device on the chain, found {devices}")?;
        return close_report(w);
    }

    let ir_len = engine.detect_ir_length()?;
    if ir_len == 0 {
        writeln!(w, "cannot determine the IR length")?;
        return close_report(w);
    }
    tracing::debug!("IR length: {ir_len}");

    // The all-ones opcode is BYPASS by definition and is skipped.
    let opcode_max = (1u32 << ir_len) - 1;
    for opcode in 0..opcode_max {
        let dr_len = engine.detect_dr_length(opcode)?;
        tracing::trace!("opcode {opcode:#x}: {dr_len}-bit DR");
        if dr_len > 1 {
            writeln!(w, "opcode 0x{opcode:x} selects a {dr_len}-bit DR")?;
        }
    }

    close_report(w)
}
