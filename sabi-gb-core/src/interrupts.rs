use crate::cpu::Address;
use crate::Byte;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

/// One interrupt source: its bit in IF/IE, its fixed service routine
/// address, and the cycle cost of a dispatch.
#[derive(Debug)]
pub struct Interrupt {
    pub kind: InterruptKind,
    pub mask: Byte,
    pub vector_addr: Address,
    pub cpu_cycles: u8,
}

pub const VBLANK: Interrupt = Interrupt {
    kind: InterruptKind::VBlank,
    mask: 0b0000_0001,
    vector_addr: 0x40,
    cpu_cycles: 20,
};

pub const LCD_STAT: Interrupt = Interrupt {
    kind: InterruptKind::LcdStat,
    mask: 0b0000_0010,
    vector_addr: 0x48,
    cpu_cycles: 20,
};

pub const TIMER: Interrupt = Interrupt {
    kind: InterruptKind::Timer,
    mask: 0b0000_0100,
    vector_addr: 0x50,
    cpu_cycles: 20,
};

pub const SERIAL: Interrupt = Interrupt {
    kind: InterruptKind::Serial,
    mask: 0b0000_1000,
    vector_addr: 0x58,
    cpu_cycles: 20,
};

pub const JOYPAD: Interrupt = Interrupt {
    kind: InterruptKind::Joypad,
    mask: 0b0001_0000,
    vector_addr: 0x60,
    cpu_cycles: 20,
};

/// Fixed dispatch priority: lowest IF/IE bit first.
pub const PRIORITY_ORDER: [&Interrupt; 5] = [&VBLANK, &LCD_STAT, &TIMER, &SERIAL, &JOYPAD];

/// Only these five bits of IF/IE are wired.
pub const INTERRUPT_BITS: Byte = 0b0001_1111;
