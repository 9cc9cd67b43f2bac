//! The probing commands and their shared plumbing.

pub mod boundary;
pub mod bypass;
pub mod idcode;
pub mod loopback;
pub mod opcode;

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{bail, Context, Result};

use crate::gpio::cdev::CdevDriver;
use crate::gpio::rpio::RpioDriver;
use crate::gpio::GpioDriver;
use crate::probe::{JtagEngine, NamedPin, PinRoles, ScanConfig, IGNORE_PIN};

/// GPIO backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DriverKind {
    /// Memory-mapped Broadcom SoC GPIO.
    Rpio,
    /// Linux GPIO character device.
    Gpiod,
}

/// Options shared by every probing command.
#[derive(Debug, clap::Args)]
pub struct ScanOptions {
    /// GPIO backend to drive the pins with.
    #[clap(long, value_enum, default_value = "rpio")]
    pub driver: DriverKind,

    /// Character-device chip index (gpiod backend only).
    #[clap(long, default_value_t = 0)]
    pub gpiochip: u32,

    /// Microseconds to dwell after every pin write; the clock half-period.
    #[clap(long, default_value_t = 10)]
    pub delay_tck: u64,

    /// Microseconds to hold an nTRST candidate low.
    #[clap(long, default_value_t = 10_000)]
    pub delay_reset: u64,

    /// Enable the internal pull-ups while initializing pins.
    #[clap(long)]
    pub pullup: bool,

    /// Measure DR lengths through the legacy Shift-IR re-entry path.
    #[clap(long)]
    pub dr_scan_via_ir: bool,
}

impl ScanOptions {
    /// Open the selected backend and wrap it in an engine.
    pub fn attach(&self) -> Result<JtagEngine> {
        let driver: Box<dyn GpioDriver> = match self.driver {
            DriverKind::Rpio => Box::new(
                RpioDriver::open().context("cannot open the memory-mapped GPIO block")?,
            ),
            DriverKind::Gpiod => Box::new(
                CdevDriver::open(self.gpiochip)
                    .with_context(|| format!("cannot open /dev/gpiochip{}", self.gpiochip))?,
            ),
        };
        Ok(JtagEngine::new(driver, self.config()))
    }

    fn config(&self) -> ScanConfig {
        ScanConfig {
            delay_tck: self.delay_tck,
            delay_reset: self.delay_reset,
            pullup: self.pullup,
            dr_scan_via_ir: self.dr_scan_via_ir,
        }
    }
}

/// A validated `--pins` table.
#[derive(Debug, Clone)]
pub struct PinTable(pub Vec<NamedPin>);

/// Parse a `--pins` JSON object mapping labels to GPIO numbers.
pub fn parse_pin_map(raw: &str) -> Result<PinTable> {
    let map: BTreeMap<String, u8> =
        serde_json::from_str(raw).context("malformed --pins JSON")?;
    let mut pins: Vec<NamedPin> = Vec::with_capacity(map.len());
    for (label, pin) in map {
        if pin == IGNORE_PIN {
            bail!("pin {pin} is reserved");
        }
        if pins.iter().any(|p| p.pin == pin) {
            bail!("pin {pin} is listed twice");
        }
        pins.push(NamedPin { label, pin });
    }
    if pins.is_empty() {
        bail!("the pin table is empty");
    }
    Ok(PinTable(pins))
}

/// A validated `--known-pins` role assignment.
#[derive(Debug, Clone)]
pub struct KnownPins {
    pub roles: PinRoles,
    pub pins: Vec<NamedPin>,
}

/// Parse a `--known-pins` JSON object with `tdi`, `tdo`, `tck`, `tms` and
/// optionally `trst` keys.
pub fn parse_known_pins(raw: &str) -> Result<KnownPins> {
    #[derive(serde::Deserialize)]
    struct Known {
        tdi: u8,
        tdo: u8,
        tck: u8,
        tms: u8,
        #[serde(default)]
        trst: Option<u8>,
    }

    let known: Known = serde_json::from_str(raw).context("malformed --known-pins JSON")?;
    let roles = PinRoles {
        tck: known.tck,
        tms: known.tms,
        tdi: known.tdi,
        tdo: known.tdo,
        trst: known.trst.unwrap_or(IGNORE_PIN),
    };

    let named = [
        ("tck", roles.tck),
        ("tms", roles.tms),
        ("tdi", roles.tdi),
        ("tdo", roles.tdo),
        ("trst", roles.trst),
    ];
    let mut pins = Vec::new();
    for (label, pin) in named {
        if pin == IGNORE_PIN {
            if label != "trst" {
                bail!("pin {pin} is reserved");
            }
            continue;
        }
        if pins.iter().any(|p: &NamedPin| p.pin == pin) {
            bail!("pin {pin} is assigned to more than one role");
        }
        pins.push(NamedPin {
            label: label.to_string(),
            pin,
        });
    }
    Ok(KnownPins { roles, pins })
}

pub(crate) const BANNER: &str = "================================";

pub(crate) fn open_report(w: &mut dyn Write, headline: &str) -> Result<()> {
    writeln!(w, "{BANNER}")?;
    writeln!(w, "{headline}")?;
    Ok(())
}

pub(crate) fn close_report(w: &mut dyn Write) -> Result<()> {
    writeln!(w, "{BANNER}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_map_parses_and_validates() {
        let table = parse_pin_map(r#"{"a": 18, "b": 23}"#).unwrap().0;
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].label, "a");
        assert_eq!(table[0].pin, 18);

        assert!(parse_pin_map(r#"{"a": 18, "b": 18}"#).is_err());
        assert!(parse_pin_map(r#"{"a": 255}"#).is_err());
        assert!(parse_pin_map(r#"{"a": 300}"#).is_err());
        assert!(parse_pin_map("[]").is_err());
    }

    #[test]
    fn known_pins_parse_with_optional_trst() {
        let known =
            parse_known_pins(r#"{"tdi": 18, "tdo": 23, "tck": 25, "tms": 24}"#).unwrap();
        assert_eq!(known.roles.trst, IGNORE_PIN);
        assert_eq!(known.pins.len(), 4);

        let known =
            parse_known_pins(r#"{"tdi": 18, "tdo": 23, "tck": 25, "tms": 24, "trst": 8}"#)
                .unwrap();
        assert_eq!(known.roles.trst, 8);
        assert_eq!(known.pins.len(), 5);

        assert!(parse_known_pins(r#"{"tdi": 18, "tdo": 18, "tck": 25, "tms": 24}"#).is_err());
    }
}
