//! Boundary-scan dump through a SAMPLE-style opcode.

use std::io::Write;

use anyhow::Result;

use crate::probe::{bits_from_str, JtagEngine};

use super::{close_report, open_report, KnownPins, ScanOptions};

/// TDO samples taken after loading the SAMPLE instruction.
const SAMPLES: usize = 2000;
const GROUP_BITS: usize = 32;
const LINE_BITS: usize = 128;

/// Dump boundary-scan cells from a single-device chain.
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
        boundary_scan(&mut engine, w)?;
        engine.close()?;
        Ok(())
    }
}

/// Load `101`, zero-padded to the IR width, as the instruction (SAMPLE on
/// many, though not all, targets), then stream TDO with no further TMS
/// activity.
pub fn boundary_scan(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    open_report(w, "boundary scan")?;

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

    let mut instruction = bits_from_str("101");
    instruction.resize(ir_len, false);
    engine.send_instruction(&instruction)?;

    for i in 0..SAMPLES {
        let bit = engine.sample_tdo()?;
        write!(w, "{}", if bit { '1' } else { '0' })?;
        let taken = i + 1;
        if taken % LINE_BITS == 0 {
            writeln!(w)?;
        } else if taken % GROUP_BITS == 0 {
            write!(w, " ")?;
        }
        engine.pulse_tck(1)?;
    }
    if SAMPLES % LINE_BITS != 0 {
        writeln!(w)?;
    }

    close_report(w)
}
