use sabi_gb_core::{Bus, Byte, Cpu};

pub const ENTRY_POINT: u16 = 0x0100;

/// Builds a CPU around a flat ROM image whose code starts at the
/// cartridge entry point, the address execution begins at after boot.
pub fn cpu_with_program(program: &[Byte]) -> Cpu<'static> {
    let mut image = vec![0x00; ENTRY_POINT as usize];
    image.extend_from_slice(program);

    let mut bus = Bus::new();
    bus.load_rom(&image);

    Cpu::new(bus)
}
