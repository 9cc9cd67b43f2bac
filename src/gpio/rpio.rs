//! Memory-mapped Broadcom SoC backend.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rppal::gpio::{Gpio, IoPin, Mode, PullUpDown};

use super::{GpioDriver, GpioError, Level};

/// GPIO backend for BCM283x-class SoCs, memory mapped through the SoC's
/// GPIO block. Fast, and the internal pull-up/pull-off network is
/// controllable.
pub struct RpioDriver {
    gpio: Gpio,
    pins: HashMap<u8, IoPin>,
}

impl RpioDriver {
    pub fn open() -> Result<Self, GpioError> {
        Ok(Self {
            gpio: Gpio::new()?,
            pins: HashMap::new(),
        })
    }

    /// Pin handle in whatever mode it currently has, requested as output
    /// when seen for the first time.
    fn pin(&mut self, pin: u8) -> Result<&mut IoPin, GpioError> {
        match self.pins.entry(pin) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => Ok(e.insert(self.gpio.get(pin)?.into_io(Mode::Output))),
        }
    }

    fn pin_as(&mut self, pin: u8, mode: Mode) -> Result<&mut IoPin, GpioError> {
        let io = self.pin(pin)?;
        if io.mode() != mode {
            io.set_mode(mode);
        }
        Ok(io)
    }
}

impl From<Level> for rppal::gpio::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => rppal::gpio::Level::Low,
            Level::High => rppal::gpio::Level::High,
        }
    }
}

impl GpioDriver for RpioDriver {
    fn pin_write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        self.pin_as(pin, Mode::Output)?.write(level.into());
        Ok(())
    }

    fn pin_read(&mut self, pin: u8) -> Result<Level, GpioError> {
        let level = self.pin(pin)?.read();
        Ok(Level::from(level == rppal::gpio::Level::High))
    }

    fn pin_output(&mut self, pin: u8) -> Result<(), GpioError> {
        self.pin_as(pin, Mode::Output)?;
        Ok(())
    }

    fn pin_input(&mut self, pin: u8) -> Result<(), GpioError> {
        self.pin_as(pin, Mode::Input)?;
        Ok(())
    }

    fn pin_pull_up(&mut self, pin: u8) -> Result<(), GpioError> {
        self.pin(pin)?.set_pullupdown(PullUpDown::PullUp);
        Ok(())
    }

    fn pin_pull_off(&mut self, pin: u8) -> Result<(), GpioError> {
        self.pin(pin)?.set_pullupdown(PullUpDown::Off);
        Ok(())
    }

    fn close(&mut self) -> Result<(), GpioError> {
        self.pins.clear();
        Ok(())
    }
}
