use crate::Byte;

pub trait NthBit {
    fn nth_bit(&self, bit_n: Self) -> bool;
}

impl NthBit for Byte {
    #[inline]
    fn nth_bit(&self, bit_n: Self) -> bool {
        self >> bit_n & 1 == 1
    }
}
