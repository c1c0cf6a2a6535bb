use crate::cpu::Address;
use crate::Byte;

/// Byte-addressable access to the shared 64 KiB space.
///
/// Every address is valid; the 16-bit address arithmetic wraps, so no
/// implementation may fault on any input.
pub trait Memory {
    fn read(&self, addr: Address) -> Byte;
    fn write(&mut self, addr: Address, value: Byte);

    fn read_u16(&self, addr: Address) -> u16 {
        let lo = self.read(addr);
        let hi = self.read(addr.wrapping_add(1));

        u16::from_le_bytes([lo, hi])
    }

    fn write_u16(&mut self, addr: Address, data: u16) {
        let [lo, hi] = data.to_le_bytes();

        self.write(addr, lo);
        self.write(addr.wrapping_add(1), hi);
    }
}
