//! IDCODE register decoding.

use std::fmt;

use bitfield::bitfield;

bitfield! {
    /// A 32-bit JTAG IDCODE as captured from the chain.
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct IdCode(u32);
    impl Debug;

    u8;
    /// Design version.
    pub version, set_version: 31, 28;

    u16;
    /// Part number.
    pub part_number, set_part_number: 27, 12;

    /// The 11-bit JEP-106 manufacturer field.
    pub manufacturer, set_manufacturer: 11, 1;

    u8;
    /// JEP-106 continuation count.
    pub manufacturer_continuation, set_manufacturer_continuation: 11, 8;

    /// JEP-106 identity code.
    pub manufacturer_identity, set_manufacturer_identity: 7, 1;

    bool;
    /// Set on every implemented IDCODE.
    pub lsbit, set_lsbit: 0;
}

impl From<u32> for IdCode {
    fn from(raw: u32) -> Self {
        IdCode(raw)
    }
}

impl IdCode {
    /// The word as it came off the wire.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// An implemented IDCODE always carries a 1 in its least significant
    /// bit; a floating or stuck bus reads back as all ones.
    pub fn valid(&self) -> bool {
        self.lsbit() && self.0 != 0xFFFF_FFFF
    }

    /// JEP-106 manufacturer name, if listed.
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        let cc = self.manufacturer_continuation();
        let id = self.manufacturer_identity();
        jep106::JEP106Code::new(cc, id).get()
    }
}

impl fmt::Display for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.manufacturer_name().unwrap_or("unknown");
        write!(
            f,
            "0x{:08x} (mfg: 0x{:03x} ({}), part: 0x{:04x}, ver: 0x{:x})",
            self.0,
            self.manufacturer(),
            name,
            self.part_number(),
            self.version()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_decodes_the_jep106_fields() {
        let broadcom = IdCode(0x0684_617F);
        assert_eq!(
            broadcom.to_string(),
            "0x0684617f (mfg: 0x0bf (Broadcom), part: 0x6846, ver: 0x0)"
        );

        let arm = IdCode(0x4BA0_0477);
        assert_eq!(
            arm.to_string(),
            "0x4ba00477 (mfg: 0x23b (ARM Ltd), part: 0xba00, ver: 0x4)"
        );
    }

    #[test]
    fn stuck_or_unimplemented_codes_are_invalid() {
        assert!(!IdCode(0xFFFF_FFFF).valid());
        assert!(!IdCode(0x0684_617E).valid());
        assert!(IdCode(0x0684_617F).valid());
    }
}
