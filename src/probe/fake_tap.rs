//! A software TAP model standing in for real hardware.
//!
//! Implements [`GpioDriver`] over a simulated scan chain so the probe
//! routines can be exercised without a target attached. The model keeps a
//! full sixteen-state controller, per-device IR/DR shift paths, optional
//! shorted pin pairs, a noisy pin, and an optional nTRST wire that holds
//! the controller in Test-Logic-Reset while low.
//!
//! TDO is only driven in the two shift states; anywhere else (and with no
//! device wired at all) reads float high, which is what a pulled-up line
//! looks like on real hardware.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::gpio::{GpioDriver, GpioError, Level};

/// The sixteen controller states of IEEE 1149.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl TapState {
    fn advance(self, tms: bool) -> TapState {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, true) => TestLogicReset,
            (TestLogicReset, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (RunTestIdle, false) => RunTestIdle,
            (SelectDrScan, true) => SelectIrScan,
            (SelectDrScan, false) => CaptureDr,
            (CaptureDr, true) => Exit1Dr,
            (CaptureDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (Exit1Dr, true) => UpdateDr,
            (Exit1Dr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (PauseDr, false) => PauseDr,
            (Exit2Dr, true) => UpdateDr,
            (Exit2Dr, false) => ShiftDr,
            (UpdateDr, true) => SelectDrScan,
            (UpdateDr, false) => RunTestIdle,
            (SelectIrScan, true) => TestLogicReset,
            (SelectIrScan, false) => CaptureIr,
            (CaptureIr, true) => Exit1Ir,
            (CaptureIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (Exit1Ir, true) => UpdateIr,
            (Exit1Ir, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (PauseIr, false) => PauseIr,
            (Exit2Ir, true) => UpdateIr,
            (Exit2Ir, false) => ShiftIr,
            (UpdateIr, true) => SelectDrScan,
            (UpdateIr, false) => RunTestIdle,
        }
    }
}

/// How the simulated target is wired to host GPIO numbers.
#[derive(Debug, Clone)]
pub struct Wiring {
    pub tck: u8,
    pub tms: u8,
    pub tdi: u8,
    pub tdo: u8,
    pub trst: Option<u8>,
}

impl Wiring {
    /// Nothing connected; all reads float high.
    pub fn none() -> Self {
        Self {
            tck: 0xFF,
            tms: 0xFF,
            tdi: 0xFF,
            tdo: 0xFF,
            trst: None,
        }
    }
}

/// One simulated device on the chain. `ir_len` must be at least 1.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub ir_len: usize,
    pub idcode: Option<u32>,
    /// Opcode decoding to the identification register.
    pub idcode_opcode: u32,
}

impl FakeDevice {
    /// Device with an identification register selected by opcode 1 (and
    /// after a controller reset).
    pub fn with_idcode(ir_len: usize, idcode: u32) -> Self {
        Self {
            ir_len,
            idcode: Some(idcode),
            idcode_opcode: 0b1,
        }
    }

    /// Device without an identification register; resets into BYPASS.
    pub fn bypass_only(ir_len: usize) -> Self {
        Self {
            ir_len,
            idcode: None,
            idcode_opcode: 0b1,
        }
    }
}

struct DeviceState {
    dev: FakeDevice,
    ir_shift: Vec<bool>,
    instruction: u64,
    dr_shift: Vec<bool>,
}

impl DeviceState {
    fn new(dev: FakeDevice) -> Self {
        let mut state = Self {
            ir_shift: vec![false; dev.ir_len],
            instruction: 0,
            dr_shift: vec![false],
            dev,
        };
        state.reset_instruction();
        state
    }

    fn bypass_opcode(&self) -> u64 {
        (1u64 << self.dev.ir_len) - 1
    }

    fn reset_instruction(&mut self) {
        self.instruction = match self.dev.idcode {
            Some(_) => u64::from(self.dev.idcode_opcode),
            None => self.bypass_opcode(),
        };
    }

    fn capture_ir(&mut self) {
        // Mandatory capture value ends in 01.
        self.ir_shift = vec![false; self.dev.ir_len];
        self.ir_shift[0] = true;
    }

    fn shift_ir(&mut self, tdi: bool) -> bool {
        let out = self.ir_shift.remove(0);
        self.ir_shift.push(tdi);
        out
    }

    fn update_ir(&mut self) {
        let mut value = 0u64;
        for (i, bit) in self.ir_shift.iter().enumerate() {
            if *bit {
                value |= 1 << i;
            }
        }
        self.instruction = value;
    }

    fn capture_dr(&mut self) {
        self.dr_shift = match self.dev.idcode {
            Some(id) if self.instruction == u64::from(self.dev.idcode_opcode) => {
                (0..32).map(|i| (id >> i) & 1 != 0).collect()
            }
            // BYPASS, and every opcode this device does not implement.
            _ => vec![false],
        };
    }

    fn shift_dr(&mut self, tdi: bool) -> bool {
        let out = self.dr_shift.remove(0);
        self.dr_shift.push(tdi);
        out
    }
}

struct Chain {
    devices: Vec<DeviceState>,
    state: TapState,
}

impl Chain {
    fn reset(&mut self) {
        self.state = TapState::TestLogicReset;
        for dev in &mut self.devices {
            dev.reset_instruction();
        }
    }

    /// One rising edge of TCK. Bits enter the chain at the device nearest
    /// host TDI (`devices[0]`) and leave at the last one.
    fn clock(&mut self, tms: bool, tdi: bool) {
        match self.state {
            TapState::CaptureDr => {
                for dev in &mut self.devices {
                    dev.capture_dr();
                }
            }
            TapState::ShiftDr => {
                let mut bit = tdi;
                for dev in &mut self.devices {
                    bit = dev.shift_dr(bit);
                }
            }
            TapState::CaptureIr => {
                for dev in &mut self.devices {
                    dev.capture_ir();
                }
            }
            TapState::ShiftIr => {
                let mut bit = tdi;
                for dev in &mut self.devices {
                    bit = dev.shift_ir(bit);
                }
            }
            _ => {}
        }

        let next = self.state.advance(tms);
        if next == TapState::UpdateIr {
            for dev in &mut self.devices {
                dev.update_ir();
            }
        }
        if next == TapState::TestLogicReset {
            for dev in &mut self.devices {
                dev.reset_instruction();
            }
        }
        self.state = next;
    }

    fn driving(&self) -> bool {
        !self.devices.is_empty()
            && matches!(self.state, TapState::ShiftDr | TapState::ShiftIr)
    }

    fn tdo(&self) -> bool {
        match (self.state, self.devices.last()) {
            (TapState::ShiftDr, Some(last)) => last.dr_shift[0],
            (TapState::ShiftIr, Some(last)) => last.ir_shift[0],
            _ => true,
        }
    }
}

#[derive(Clone, Copy)]
struct PinState {
    level: Level,
    output: bool,
}

struct Inner {
    wiring: Wiring,
    chain: Chain,
    pins: HashMap<u8, PinState>,
    shorts: Vec<(u8, u8)>,
    noise: Vec<u8>,
    noise_flip: bool,
    last_tck: bool,
    input_requests: usize,
}

impl Inner {
    fn driven_level(&self, pin: u8) -> Option<Level> {
        self.pins.get(&pin).filter(|p| p.output).map(|p| p.level)
    }

    /// What the target sees on a host pin: the driven level, or a
    /// pulled-up float when nothing drives it.
    fn wire_level(&self, pin: u8) -> bool {
        self.driven_level(pin).map_or(true, |l| l.is_high())
    }

    fn trst_low(&self) -> bool {
        self.wiring.trst.map_or(false, |p| !self.wire_level(p))
    }

    fn short_partner(&self, pin: u8) -> Option<u8> {
        self.shorts.iter().find_map(|&(a, b)| {
            if a == pin {
                Some(b)
            } else if b == pin {
                Some(a)
            } else {
                None
            }
        })
    }
}

/// Shared handle onto the simulated target. Cloning shares the state, so a
/// test can keep one handle for inspection while the engine owns the other.
#[derive(Clone)]
pub struct FakeTap {
    inner: Rc<RefCell<Inner>>,
}

impl FakeTap {
    pub fn new(wiring: Wiring, devices: Vec<FakeDevice>) -> Self {
        let chain = Chain {
            devices: devices.into_iter().map(DeviceState::new).collect(),
            state: TapState::TestLogicReset,
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                wiring,
                chain,
                pins: HashMap::new(),
                shorts: Vec::new(),
                noise: Vec::new(),
                noise_flip: false,
                last_tck: false,
                input_requests: 0,
            })),
        }
    }

    /// A board with no JTAG on it at all.
    pub fn disconnected() -> Self {
        Self::new(Wiring::none(), Vec::new())
    }

    /// Short two pins together.
    pub fn with_short(self, a: u8, b: u8) -> Self {
        self.inner.borrow_mut().shorts.push((a, b));
        self
    }

    /// Make reads of `pin` alternate, like a line picking up crosstalk.
    pub fn with_noise(self, pin: u8) -> Self {
        self.inner.borrow_mut().noise.push(pin);
        self
    }

    /// Current controller state.
    pub fn state(&self) -> TapState {
        self.inner.borrow().chain.state
    }

    /// The opcode that selects the identification register of `device`.
    pub fn idcode_opcode(&self, device: usize) -> u32 {
        self.inner.borrow().chain.devices[device].dev.idcode_opcode
    }

    /// How many times a line was reconfigured as an input.
    pub fn input_requests(&self) -> usize {
        self.inner.borrow().input_requests
    }
}

impl GpioDriver for FakeTap {
    fn pin_write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        let mut inner = self.inner.borrow_mut();
        inner.pins.insert(
            pin,
            PinState {
                level,
                output: true,
            },
        );

        if inner.trst_low() {
            inner.chain.reset();
        }

        if pin == inner.wiring.tck {
            let high = level.is_high();
            if high && !inner.last_tck && !inner.trst_low() {
                let tms = inner.wire_level(inner.wiring.tms);
                let tdi = inner.wire_level(inner.wiring.tdi);
                inner.chain.clock(tms, tdi);
            }
            inner.last_tck = high;
        }
        Ok(())
    }

    fn pin_read(&mut self, pin: u8) -> Result<Level, GpioError> {
        let mut inner = self.inner.borrow_mut();
        if inner.noise.contains(&pin) {
            inner.noise_flip = !inner.noise_flip;
            return Ok(Level::from(inner.noise_flip));
        }
        if pin == inner.wiring.tdo && inner.chain.driving() {
            return Ok(Level::from(inner.chain.tdo()));
        }
        if let Some(partner) = inner.short_partner(pin) {
            if let Some(level) = inner.driven_level(partner) {
                return Ok(level);
            }
        }
        // Unconnected inputs float high; reading an output gives back the
        // driven level.
        Ok(inner.driven_level(pin).unwrap_or(Level::High))
    }

    fn pin_output(&mut self, pin: u8) -> Result<(), GpioError> {
        let mut inner = self.inner.borrow_mut();
        let level = inner.pins.get(&pin).map_or(Level::Low, |p| p.level);
        inner.pins.insert(
            pin,
            PinState {
                level,
                output: true,
            },
        );
        Ok(())
    }

    fn pin_input(&mut self, pin: u8) -> Result<(), GpioError> {
        let mut inner = self.inner.borrow_mut();
        let level = inner.pins.get(&pin).map_or(Level::Low, |p| p.level);
        inner.pins.insert(
            pin,
            PinState {
                level,
                output: false,
            },
        );
        inner.input_requests += 1;
        Ok(())
    }

    fn pin_pull_up(&mut self, _pin: u8) -> Result<(), GpioError> {
        Ok(())
    }

    fn pin_pull_off(&mut self, _pin: u8) -> Result<(), GpioError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), GpioError> {
        self.inner.borrow_mut().pins.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_ones_reach_test_logic_reset_from_anywhere() {
        let wiring = Wiring {
            tck: 0,
            tms: 1,
            tdi: 2,
            tdo: 3,
            trst: None,
        };
        let tap = FakeTap::new(wiring, vec![FakeDevice::bypass_only(4)]);
        let mut driver = tap.clone();

        // Wander a few arbitrary TMS steps first.
        for tms in [false, true, false, false, true] {
            driver.pin_write(1, Level::from(tms)).unwrap();
            driver.pin_write(0, Level::High).unwrap();
            driver.pin_write(0, Level::Low).unwrap();
        }
        driver.pin_write(1, Level::High).unwrap();
        for _ in 0..5 {
            driver.pin_write(0, Level::High).unwrap();
            driver.pin_write(0, Level::Low).unwrap();
        }
        assert_eq!(tap.state(), TapState::TestLogicReset);
    }

    #[test]
    fn shorted_pins_echo_the_driven_level() {
        let mut tap = FakeTap::disconnected().with_short(3, 4);
        tap.pin_write(4, Level::Low).unwrap();
        assert_eq!(tap.pin_read(3).unwrap(), Level::Low);
        tap.pin_write(4, Level::High).unwrap();
        assert_eq!(tap.pin_read(3).unwrap(), Level::High);
        // Other pins keep floating high.
        assert_eq!(tap.pin_read(9).unwrap(), Level::High);
    }
}
