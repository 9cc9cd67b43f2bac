//! Generic character-device backend on `/dev/gpiochipN`.

use std::collections::HashMap;

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};

use super::{GpioDriver, GpioError, Level};

const CONSUMER: &str = "jtagscan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

struct Line {
    handle: LineHandle,
    direction: Direction,
}

/// GPIO backend on the Linux GPIO character device.
///
/// Works on anything exposing `/dev/gpiochipN`. Line handles are requested
/// lazily and memoized per pin id; a direction change releases the handle
/// and requests the line again. The ioctl ABI used here exposes no bias
/// control, so the pull operations are no-ops.
pub struct CdevDriver {
    chip: Chip,
    lines: HashMap<u8, Line>,
}

impl CdevDriver {
    /// Open `/dev/gpiochip<index>`.
    pub fn open(index: u32) -> Result<Self, GpioError> {
        let chip = Chip::new(format!("/dev/gpiochip{index}"))?;
        Ok(Self {
            chip,
            lines: HashMap::new(),
        })
    }

    fn request(
        &mut self,
        pin: u8,
        direction: Direction,
        default: Level,
    ) -> Result<&Line, GpioError> {
        // The kernel refuses a second request while the old handle is held.
        self.lines.remove(&pin);
        let flags = match direction {
            Direction::Input => LineRequestFlags::INPUT,
            Direction::Output => LineRequestFlags::OUTPUT,
        };
        let line = self.chip.get_line(u32::from(pin))?;
        let handle = line.request(flags, default.is_high() as u8, CONSUMER)?;
        Ok(self
            .lines
            .entry(pin)
            .or_insert(Line { handle, direction }))
    }

    fn ensure(&mut self, pin: u8, direction: Direction) -> Result<(), GpioError> {
        if !matches!(self.lines.get(&pin), Some(l) if l.direction == direction) {
            self.request(pin, direction, Level::Low)?;
        }
        Ok(())
    }
}

impl GpioDriver for CdevDriver {
    fn pin_write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        match self.lines.get(&pin) {
            Some(l) if l.direction == Direction::Output => {
                l.handle.set_value(level.is_high() as u8)?;
                Ok(())
            }
            _ => self.request(pin, Direction::Output, level).map(|_| ()),
        }
    }

    fn pin_read(&mut self, pin: u8) -> Result<Level, GpioError> {
        if let Some(l) = self.lines.get(&pin) {
            return Ok(Level::from(l.handle.get_value()? != 0));
        }
        let line = self.request(pin, Direction::Input, Level::Low)?;
        Ok(Level::from(line.handle.get_value()? != 0))
    }

    fn pin_output(&mut self, pin: u8) -> Result<(), GpioError> {
        self.ensure(pin, Direction::Output)
    }

    fn pin_input(&mut self, pin: u8) -> Result<(), GpioError> {
        self.ensure(pin, Direction::Input)
    }

    fn pin_pull_up(&mut self, pin: u8) -> Result<(), GpioError> {
        tracing::trace!("pull-up requested for pin {pin}: not supported by this backend");
        Ok(())
    }

    fn pin_pull_off(&mut self, pin: u8) -> Result<(), GpioError> {
        tracing::trace!("pull-off requested for pin {pin}: not supported by this backend");
        Ok(())
    }

    fn close(&mut self) -> Result<(), GpioError> {
        self.lines.clear();
        Ok(())
    }
}
