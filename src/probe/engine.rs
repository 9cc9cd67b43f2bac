//! Bit-banged TAP control: pin primitives, TMS walking and the shift
//! engines.

use std::thread;
use std::time::Duration;

use bitvec::prelude::*;

use crate::gpio::{GpioDriver, GpioError, Level};

use super::{NamedPin, PinRoles, ScanConfig, IGNORE_PIN, TAP_SHIFTDR, TAP_SHIFTIR};

/// Bit-banged JTAG engine over a GPIO backend.
///
/// The engine owns the driver, the current role assignment and the tuning
/// knobs. Every high-level probe call leaves the TAP in Run-Test/Idle, so
/// calls compose without re-synchronisation.
pub struct JtagEngine {
    driver: Box<dyn GpioDriver>,
    config: ScanConfig,
    roles: PinRoles,
    pins: Vec<NamedPin>,
}

impl JtagEngine {
    pub fn new(driver: Box<dyn GpioDriver>, config: ScanConfig) -> Self {
        Self {
            driver,
            config,
            roles: PinRoles::none(),
            pins: Vec::new(),
        }
    }

    /// Replace the enumerated pin table. Labels only show up in reports.
    pub fn set_pins(&mut self, pins: Vec<NamedPin>) {
        self.pins = pins;
    }

    /// Assign signal roles for the next probe pass.
    pub fn set_roles(&mut self, roles: PinRoles) {
        self.roles = roles;
    }

    pub fn roles(&self) -> PinRoles {
        self.roles
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn pins(&self) -> &[NamedPin] {
        &self.pins
    }

    /// Release the underlying GPIO lines.
    pub fn close(&mut self) -> Result<(), GpioError> {
        self.driver.close()
    }

    fn delay(&self, us: u64) {
        if us > 0 {
            thread::sleep(Duration::from_micros(us));
        }
    }

    pub(crate) fn pin_write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        self.driver.pin_write(pin, level)
    }

    /// Write a level, then dwell for the configured half-period.
    fn pin_write_delay(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        self.driver.pin_write(pin, level)?;
        self.delay(self.config.delay_tck);
        Ok(())
    }

    /// Produce `n` complete TCK cycles, high dwell then low dwell. TDI and
    /// TMS must already hold the values intended for these cycles.
    pub(crate) fn pulse_tck(&mut self, n: usize) -> Result<(), GpioError> {
        for _ in 0..n {
            self.pin_write_delay(self.roles.tck, Level::High)?;
            self.pin_write_delay(self.roles.tck, Level::Low)?;
        }
        Ok(())
    }

    /// Assert TMS and clock once, advancing the TAP one state.
    pub(crate) fn pulse_tms(&mut self, tms: Level) -> Result<(), GpioError> {
        self.pin_write(self.roles.tms, tms)?;
        self.pulse_tck(1)
    }

    /// Walk a TMS string left to right, one TCK cycle per character.
    pub fn set_tap_state(&mut self, path: &str) -> Result<(), GpioError> {
        for c in path.chars() {
            self.pulse_tms(Level::from(c == '1'))?;
        }
        Ok(())
    }

    pub(crate) fn sample_tdo(&mut self) -> Result<bool, GpioError> {
        Ok(self.driver.pin_read(self.roles.tdo)?.is_high())
    }

    /// Shift `bits` through the register entered via `path` and return the
    /// same-length TDO capture. Index 0 goes on the wire first. Capture
    /// happens before the clock pulse of each cycle; the last cycle raises
    /// TMS so the TAP leaves Shift, and two trailing TMS pulses bring it
    /// home through Exit1 and Update to Run-Test/Idle.
    fn shift(&mut self, path: &str, bits: &BitSlice<u8>) -> Result<BitVec<u8>, GpioError> {
        if bits.is_empty() {
            return Ok(BitVec::new());
        }
        self.set_tap_state(path)?;
        let mut captured = BitVec::with_capacity(bits.len());
        let last = bits.len() - 1;
        for (i, bit) in bits.iter().by_vals().enumerate() {
            self.pin_write(self.roles.tdi, Level::from(bit))?;
            captured.push(self.sample_tdo()?);
            if i == last {
                self.pin_write(self.roles.tms, Level::High)?;
            }
            self.pulse_tck(1)?;
        }
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::Low)?;
        Ok(captured)
    }

    /// Shift an instruction, Run-Test/Idle to Run-Test/Idle.
    pub fn send_instruction(&mut self, bits: &BitSlice<u8>) -> Result<BitVec<u8>, GpioError> {
        self.shift(TAP_SHIFTIR, bits)
    }

    /// Shift through the active data register, Run-Test/Idle to
    /// Run-Test/Idle.
    pub fn send_data(&mut self, bits: &BitSlice<u8>) -> Result<BitVec<u8>, GpioError> {
        self.shift(TAP_SHIFTDR, bits)
    }

    /// Drive every pin in the table (or, lacking a table, the pins of the
    /// current roles) to a defined state: output, high, pulled per config.
    /// TDO is then turned back into an input and TCK driven low so the
    /// first pulse yields a clean rising edge.
    pub fn init_pins(&mut self) -> Result<(), GpioError> {
        let pins: Vec<u8> = if self.pins.is_empty() {
            let r = self.roles;
            [r.tck, r.tms, r.tdi, r.tdo, r.trst]
                .into_iter()
                .filter(|&p| p != IGNORE_PIN)
                .collect()
        } else {
            self.pins.iter().map(|p| p.pin).collect()
        };
        for pin in pins {
            self.driver.pin_output(pin)?;
            self.driver.pin_write(pin, Level::High)?;
            if self.config.pullup {
                self.driver.pin_pull_up(pin)?;
            } else {
                self.driver.pin_pull_off(pin)?;
            }
        }
        if self.roles.tdo != IGNORE_PIN {
            self.driver.pin_input(self.roles.tdo)?;
        }
        if self.roles.tck != IGNORE_PIN {
            self.driver.pin_write(self.roles.tck, Level::Low)?;
        }
        Ok(())
    }

    /// Drive one arbitrary pin and dwell. Used by the loopback check and
    /// the reset-candidate probe.
    pub fn write_pin(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        self.pin_write_delay(pin, level)
    }

    /// Sample one arbitrary pin.
    pub fn read_pin(&mut self, pin: u8) -> Result<Level, GpioError> {
        self.driver.pin_read(pin)
    }

    /// Dwell for the reset-probe hold time.
    pub fn wait_reset(&self) {
        self.delay(self.config.delay_reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::fake_tap::{FakeDevice, FakeTap, TapState, Wiring};
    use crate::probe::{bits_from_str, TAP_RESET};

    fn engine(tap: &FakeTap) -> JtagEngine {
        let config = ScanConfig {
            delay_tck: 0,
            delay_reset: 0,
            ..ScanConfig::default()
        };
        let mut engine = JtagEngine::new(Box::new(tap.clone()), config);
        engine.set_roles(PinRoles {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: IGNORE_PIN,
        });
        engine
    }

    fn wiring() -> Wiring {
        Wiring {
            tck: 25,
            tms: 24,
            tdi: 18,
            tdo: 23,
            trst: None,
        }
    }

    #[test]
    fn tap_reset_lands_in_run_test_idle() {
        let tap = FakeTap::new(wiring(), vec![FakeDevice::bypass_only(4)]);
        let mut engine = engine(&tap);
        engine.init_pins().unwrap();
        engine.set_tap_state(TAP_RESET).unwrap();
        assert_eq!(tap.state(), TapState::RunTestIdle);
    }

    #[test]
    fn canonical_paths_reach_the_shift_states() {
        let tap = FakeTap::new(wiring(), vec![FakeDevice::bypass_only(4)]);
        let mut engine = engine(&tap);
        engine.init_pins().unwrap();

        engine.set_tap_state(TAP_RESET).unwrap();
        engine.set_tap_state(TAP_SHIFTDR).unwrap();
        assert_eq!(tap.state(), TapState::ShiftDr);

        engine.set_tap_state(TAP_RESET).unwrap();
        engine.set_tap_state(TAP_SHIFTIR).unwrap();
        assert_eq!(tap.state(), TapState::ShiftIr);
    }

    #[test]
    fn bypass_delays_data_by_one_cycle() {
        let tap = FakeTap::new(wiring(), vec![FakeDevice::bypass_only(4)]);
        let mut engine = engine(&tap);
        engine.init_pins().unwrap();
        engine.set_tap_state(TAP_RESET).unwrap();

        // Put the single device into BYPASS first.
        engine.send_instruction(&bits_from_str("1111")).unwrap();

        let pattern = bits_from_str("1011001110001");
        let mut tx = pattern.clone();
        tx.push(false);
        let rx = engine.send_data(&tx).unwrap();
        assert_eq!(rx.len(), tx.len());
        assert_eq!(rx[1..], pattern[..]);
    }

    #[test]
    fn long_patterns_survive_a_two_device_delay_line() {
        let tap = FakeTap::new(
            wiring(),
            vec![FakeDevice::bypass_only(4), FakeDevice::bypass_only(5)],
        );
        let mut engine = engine(&tap);
        engine.init_pins().unwrap();
        engine.set_tap_state(TAP_RESET).unwrap();

        // Fill both IRs (4 + 5 bits) with the BYPASS opcode.
        engine.send_instruction(&bits_from_str("111111111")).unwrap();

        let pattern: BitVec<u8> = (0..600).map(|i| (i * 7) % 5 < 2).collect();
        let mut tx = pattern.clone();
        tx.extend([false, false]);
        let rx = engine.send_data(&tx).unwrap();
        assert_eq!(rx[2..], pattern[..]);
    }

    #[test]
    fn shift_leaves_the_tap_in_run_test_idle() {
        let tap = FakeTap::new(wiring(), vec![FakeDevice::bypass_only(4)]);
        let mut engine = engine(&tap);
        engine.init_pins().unwrap();
        engine.set_tap_state(TAP_RESET).unwrap();
        engine.send_data(&bits_from_str("1010")).unwrap();
        assert_eq!(tap.state(), TapState::RunTestIdle);
    }
}
