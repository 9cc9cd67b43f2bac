//! Loopback check: finds shorted or interconnected pins before any JTAG
//! probing is attempted.

use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;
use bitvec::prelude::*;

use crate::gpio::Level;
use crate::probe::{bits_from_str, JtagEngine, PinRoles, IGNORE_PIN, PATTERN};

use super::{close_report, open_report, PinTable, ScanOptions};

/// Check every ordered pin pair for shorts and crosstalk.
#[derive(Debug, clap::Parser)]
pub struct Cmd {
    #[clap(flatten)]
    scan: ScanOptions,

    /// JSON object mapping pin labels to GPIO numbers.
    #[clap(long, value_parser = super::parse_pin_map)]
    pins: PinTable,
}

impl Cmd {
    pub fn run(self, w: &mut dyn Write) -> Result<()> {
        let mut engine = self.scan.attach()?;
        engine.set_pins(self.pins.0);
        check_loopback(&mut engine, w)?;
        engine.close()?;
        Ok(())
    }
}

/// Drive the pattern across every ordered (TDO, TDI) pair with no clock
/// involved and flag pairs that echo it back.
pub fn check_loopback(engine: &mut JtagEngine, w: &mut dyn Write) -> Result<()> {
    open_report(w, "loopback check")?;

    let pattern = bits_from_str(PATTERN);
    let pins = engine.pins().to_vec();
    // A short echoes in both directions; one line per pair is enough.
    let mut reported: HashSet<(u8, u8)> = HashSet::new();

    for tdo in &pins {
        for tdi in &pins {
            if tdo.pin == tdi.pin {
                continue;
            }
            tracing::debug!("loopback tdo:{} tdi:{}", tdo.label, tdi.label);
            engine.set_roles(PinRoles {
                tck: IGNORE_PIN,
                tms: IGNORE_PIN,
                tdi: tdi.pin,
                tdo: tdo.pin,
                trst: IGNORE_PIN,
            });
            engine.init_pins()?;

            let mut received: BitVec<u8> = BitVec::with_capacity(pattern.len());
            for bit in pattern.iter().by_vals() {
                engine.write_pin(tdi.pin, Level::from(bit))?;
                received.push(engine.read_pin(tdo.pin)?.is_high());
            }

            if received == pattern {
                let pair = (tdo.pin.min(tdi.pin), tdo.pin.max(tdi.pin));
                if reported.insert(pair) {
                    writeln!(
                        w,
                        "possible short detected between {} and {}",
                        tdo.label, tdi.label
                    )?;
                }
            } else if !constant(&received) {
                writeln!(
                    w,
                    "possible interconnection or cable noise between {} and {}",
                    tdo.label, tdi.label
                )?;
            }
        }
    }

    close_report(w)
}

fn constant(bits: &BitSlice<u8>) -> bool {
    bits.first().map_or(true, |first| {
        let first = *first;
        bits.iter().by_vals().all(|b| b == first)
    })
}
