//! Chain interrogation: device count, IR/DR widths, IDCODE readout.

use bitvec::prelude::*;

use crate::gpio::{GpioError, Level};

use super::engine::JtagEngine;
use super::idcode::IdCode;
use super::{
    MAX_DEV_NR, MAX_DR_LEN, MAX_IR_CHAIN_LEN, MAX_IR_LEN, MIN_IR_LEN, TAP_RESET, TAP_SHIFTDR,
    TAP_SHIFTIR,
};

impl JtagEngine {
    /// Count devices on the chain.
    ///
    /// Fills every IR with ones (BYPASS on 1149.1 parts), preloads the
    /// combined one-bit-per-device DR with ones, then chases them with
    /// zeros: the number of cycles until the first zero falls out of TDO is
    /// the chain length. Returns 0 when nothing answers within
    /// [`MAX_DEV_NR`]. Ends in Run-Test/Idle.
    pub fn detect_devices(&mut self) -> Result<usize, GpioError> {
        self.set_tap_state(TAP_RESET)?;
        self.set_tap_state(TAP_SHIFTIR)?;

        let tdi = self.roles().tdi;
        self.pin_write(tdi, Level::High)?;
        self.pulse_tck(MAX_IR_CHAIN_LEN - 1)?;

        // Exit1-IR, Update-IR, then the canonical walk into Shift-DR.
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::High)?;
        self.set_tap_state(TAP_SHIFTDR)?;

        self.pin_write(tdi, Level::High)?;
        self.pulse_tck(MAX_DEV_NR)?;
        self.pin_write(tdi, Level::Low)?;

        let mut devices = 0;
        for i in 0..MAX_DEV_NR {
            self.pulse_tck(1)?;
            if !self.sample_tdo()? {
                devices = i + 1;
                break;
            }
        }

        // Exit1 -> Update -> Run-Test/Idle.
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::Low)?;

        tracing::debug!("chain answered with {devices} device(s)");
        Ok(devices)
    }

    /// Measure the IR width of a single-device chain.
    ///
    /// Flushes the IR to zeros, then injects a one and counts cycles until
    /// it reappears on TDO. Widths outside `[MIN_IR_LEN, MAX_IR_LEN - 1]`
    /// come back as 0.
    pub fn detect_ir_length(&mut self) -> Result<usize, GpioError> {
        self.set_tap_state(TAP_RESET)?;
        self.set_tap_state(TAP_SHIFTIR)?;
        let len = self.flush_and_measure(MAX_IR_LEN)?;

        // Exit1 -> Update -> Run-Test/Idle.
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::Low)?;

        tracing::debug!("IR flush transition after {len} cycle(s)");
        Ok(if (MIN_IR_LEN..MAX_IR_LEN).contains(&len) {
            len
        } else {
            0
        })
    }

    /// Measure the width of the DR selected by `opcode` on a single-device
    /// chain. Returns 0 when the IR width is unknown or no transition shows
    /// up within [`MAX_DR_LEN`] cycles.
    ///
    /// The legacy probing path re-enters Shift-IR after the instruction has
    /// been loaded (`dr_scan_via_ir`); some targets still expose the
    /// selected DR there. The default path enters Shift-DR.
    pub fn detect_dr_length(&mut self, opcode: u32) -> Result<usize, GpioError> {
        let ir_len = self.detect_ir_length()?;
        if ir_len == 0 {
            return Ok(0);
        }

        let mut ir: BitVec<u8> = BitVec::with_capacity(ir_len);
        for bit in 0..ir_len {
            ir.push((opcode >> bit) & 1 != 0);
        }
        self.send_instruction(&ir)?;

        let path = if self.config().dr_scan_via_ir {
            TAP_SHIFTIR
        } else {
            TAP_SHIFTDR
        };
        self.set_tap_state(path)?;
        let len = self.flush_and_measure(MAX_DR_LEN)?;

        // Exit1 -> Update -> Run-Test/Idle.
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::High)?;
        self.pulse_tms(Level::Low)?;

        tracing::trace!("opcode {opcode:#x}: DR transition after {len} cycle(s)");
        Ok(len)
    }

    /// Read up to `count` IDCODEs straight after a TAP reset, LSB first.
    /// The caller decides which of them look implemented.
    pub fn read_idcodes(&mut self, count: usize) -> Result<Vec<IdCode>, GpioError> {
        self.set_tap_state(TAP_RESET)?;
        self.set_tap_state(TAP_SHIFTDR)?;

        let mut idcodes = Vec::with_capacity(count);
        for device in 0..count {
            if device > 0 {
                // Exit1 -> Pause -> Exit2 -> Shift-DR for the next device.
                self.pulse_tms(Level::Low)?;
                self.pulse_tms(Level::High)?;
                self.pulse_tms(Level::Low)?;
            }
            let mut raw = 0u32;
            for bit in 0..32 {
                if self.sample_tdo()? {
                    raw |= 1 << bit;
                }
                if bit == 31 {
                    let tms = self.roles().tms;
                    self.pin_write(tms, Level::High)?;
                }
                self.pulse_tck(1)?;
            }
            idcodes.push(IdCode::from(raw));
        }

        self.set_tap_state(TAP_RESET)?;
        Ok(idcodes)
    }

    /// Flush the register on the scan path to zeros, then inject a single
    /// one and count cycles until it shows up on TDO. 0 when it never does
    /// within `max` cycles.
    fn flush_and_measure(&mut self, max: usize) -> Result<usize, GpioError> {
        let tdi = self.roles().tdi;
        self.pin_write(tdi, Level::Low)?;
        self.pulse_tck(max - 1)?;
        self.pin_write(tdi, Level::High)?;
        for i in 0..max {
            self.pulse_tck(1)?;
            if self.sample_tdo()? {
                return Ok(i + 1);
            }
        }
        Ok(0)
    }
}
