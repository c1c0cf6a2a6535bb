//! Representation of the SM83 flag register (the F half of AF).
//!
//! Only the high nibble carries meaning; the low four bits always read
//! as zero, which the `bitflags` definition below enforces for free:
//!
//! ```text
//! 7  bit  0
//! ---- ----
//! ZNHC 0000
//! ||||
//! |||+------ Carry
//! ||+------- Half Carry (carry out of bit 3 / borrow into bit 4)
//! |+-------- Subtract (last operation was a subtraction)
//! +--------- Zero
//! ```

use crate::Byte;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlagsRegister: Byte {
        const ZERO       = 0b1000_0000;
        const SUBTRACT   = 0b0100_0000;
        const HALF_CARRY = 0b0010_0000;
        const CARRY      = 0b0001_0000;
    }
}

impl From<Byte> for FlagsRegister {
    fn from(value: Byte) -> Self {
        Self::from_bits_truncate(value)
    }
}

impl FlagsRegister {
    #[inline]
    pub fn set_zero_flag(&mut self, value: bool) {
        self.set(FlagsRegister::ZERO, value);
    }

    #[inline]
    pub fn set_subtract_flag(&mut self, value: bool) {
        self.set(FlagsRegister::SUBTRACT, value);
    }

    #[inline]
    pub fn set_half_carry_flag(&mut self, value: bool) {
        self.set(FlagsRegister::HALF_CARRY, value);
    }

    #[inline]
    pub fn set_carry_flag(&mut self, value: bool) {
        self.set(FlagsRegister::CARRY, value);
    }

    #[inline]
    pub fn carry(&self) -> bool {
        self.contains(FlagsRegister::CARRY)
    }
}
