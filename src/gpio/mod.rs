//! GPIO line access for the probe engine.
//!
//! The engine drives pins through the [`GpioDriver`] trait and never learns
//! which backend it holds. Two hardware backends exist: a memory-mapped one
//! for Broadcom SoCs ([`rpio`]) and a generic character-device one
//! ([`cdev`]).

pub mod cdev;
pub mod rpio;

/// Logic level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// Errors raised by a GPIO backend. Any of these aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    /// The GPIO character device could not be accessed.
    #[error("GPIO character device access failed")]
    Chip(#[from] gpio_cdev::errors::Error),
    /// The memory-mapped GPIO block could not be accessed.
    #[error("Broadcom GPIO block access failed")]
    Bcm(#[from] rppal::gpio::Error),
}

/// Raw GPIO primitives the probe engine drives.
///
/// `pin_write` must take effect before it returns; `pin_read` returns the
/// line's present level. Direction changes are idempotent, though a backend
/// may release and re-request the line under the hood.
pub trait GpioDriver {
    fn pin_write(&mut self, pin: u8, level: Level) -> Result<(), GpioError>;
    fn pin_read(&mut self, pin: u8) -> Result<Level, GpioError>;
    fn pin_output(&mut self, pin: u8) -> Result<(), GpioError>;
    fn pin_input(&mut self, pin: u8) -> Result<(), GpioError>;
    fn pin_pull_up(&mut self, pin: u8) -> Result<(), GpioError>;
    fn pin_pull_off(&mut self, pin: u8) -> Result<(), GpioError>;
    /// Release every line owned by the backend.
    fn close(&mut self) -> Result<(), GpioError>;
}
