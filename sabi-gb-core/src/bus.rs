use crate::cpu::{Address, Memory};
use crate::input::joypad::{Joypad, JoypadButton};
use crate::interrupts::{self, Interrupt};
use crate::ppu::{FrameStatus, Ppu};
use crate::render::Frame;
use crate::{Byte, Result};
use log::trace;

pub const ADDRESS_SPACE_SIZE: usize = 0x1_0000;

const ROM_END: Address = 0x7fff;

pub const JOYPAD_REGISTER: Address = 0xff00;
pub const INTERRUPT_FLAG: Address = 0xff0f;
pub const SCROLL_Y: Address = 0xff42;
pub const SCROLL_X: Address = 0xff43;
pub const BACKGROUND_PALETTE: Address = 0xff47;
pub const SPRITE_PALETTE_0: Address = 0xff48;
pub const SPRITE_PALETTE_1: Address = 0xff49;
pub const INTERRUPT_ENABLE: Address = 0xffff;

/// I/O register values left behind by the boot ROM, reproduced here
/// since the boot ROM itself is not emulated.
const POST_BOOT_IO: &[(Address, Byte)] = &[
    (0xff05, 0x00), // TIMA
    (0xff06, 0x00), // TMA
    (0xff07, 0x00), // TAC
    (0xff10, 0x80), // NR10
    (0xff11, 0xbf), // NR11
    (0xff12, 0xf3), // NR12
    (0xff14, 0xbf), // NR14
    (0xff16, 0x3f), // NR21
    (0xff17, 0x00), // NR22
    (0xff19, 0xbf), // NR24
    (0xff1a, 0x7f), // NR30
    (0xff1b, 0xff), // NR31
    (0xff1c, 0x9f), // NR32
    (0xff1e, 0xbf), // NR33
    (0xff20, 0xff), // NR41
    (0xff21, 0x00), // NR42
    (0xff22, 0x00), // NR43
    (0xff23, 0xbf), // NR44
    (0xff24, 0x77), // NR50
    (0xff25, 0xf3), // NR51
    (0xff26, 0xf1), // NR52
    (0xff40, 0x91), // LCDC
    (0xff42, 0x00), // SCY
    (0xff43, 0x00), // SCX
    (0xff45, 0x00), // LYC
    (0xff47, 0xfc), // BGP
    (0xff48, 0xff), // OBP0
    (0xff49, 0xff), // OBP1
    (0xff4a, 0x00), // WY
    (0xff4b, 0x00), // WX
    (0xffff, 0x00), // IE
];

/// Owns the flat 64 KiB address space shared by the CPU, the PPU and
/// the interrupt controller, plus the PPU and joypad hanging off it.
/// Hardware registers are reached through named accessors rather than
/// raw indices into the array.
pub struct Bus<'call> {
    memory: [Byte; ADDRESS_SPACE_SIZE],
    ppu: Ppu,
    joypad: Joypad,

    frame_callback: Box<dyn FnMut(&Frame) -> Result<()> + 'call>,
}

impl<'call> Bus<'call> {
    pub fn new() -> Bus<'call> {
        Self::new_with_callback(|_| Ok(()))
    }

    pub fn new_with_callback<F>(frame_callback: F) -> Bus<'call>
    where
        F: FnMut(&Frame) -> Result<()> + 'call,
    {
        let mut memory = [0; ADDRESS_SPACE_SIZE];
        for &(addr, value) in POST_BOOT_IO {
            memory[addr as usize] = value;
        }

        Bus {
            memory,
            ppu: Ppu::new(),
            joypad: Joypad::default(),
            frame_callback: Box::new(frame_callback),
        }
    }

    /// Copies a flat ROM image into the cartridge area. Bank switching
    /// belongs to the cartridge collaborator, not this core.
    pub fn load_rom(&mut self, data: &[Byte]) {
        let len = data.len().min(usize::from(ROM_END) + 1);
        self.memory[..len].copy_from_slice(&data[..len]);
    }

    /// Raw copy into the address space, bypassing register semantics.
    /// The seam used by tests and collaborators that seed memory.
    pub fn load(&mut self, start: Address, data: &[Byte]) {
        let start = usize::from(start);
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    /// Advances the PPU by the cycles one CPU step consumed. On the
    /// V-blank transition this requests the V-blank interrupt and hands
    /// the completed frame to the callback, once per frame.
    pub fn tick(&mut self, cycles: u8) -> Result<()> {
        if self.ppu.tick(cycles, &self.memory) == FrameStatus::Complete {
            self.request_interrupt(&interrupts::VBLANK);
            trace!("frame complete at line {}", self.ppu.line);
            (self.frame_callback)(&self.ppu.frame)?;
        }

        Ok(())
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn interrupt_flag(&self) -> Byte {
        self.memory[INTERRUPT_FLAG as usize]
    }

    pub fn set_interrupt_flag(&mut self, value: Byte) {
        self.memory[INTERRUPT_FLAG as usize] = value & interrupts::INTERRUPT_BITS;
    }

    pub fn interrupt_enable(&self) -> Byte {
        self.memory[INTERRUPT_ENABLE as usize]
    }

    pub fn set_interrupt_enable(&mut self, value: Byte) {
        self.memory[INTERRUPT_ENABLE as usize] = value;
    }

    /// Marks an interrupt pending. Device logic (and external
    /// collaborators, e.g. input devices) come through here.
    pub fn request_interrupt(&mut self, interrupt: &Interrupt) {
        self.memory[INTERRUPT_FLAG as usize] |= interrupt.mask;
    }

    pub fn press_button(&mut self, button: JoypadButton) {
        if self.joypad.press_button(button) {
            self.request_interrupt(&interrupts::JOYPAD);
        }
    }

    pub fn release_button(&mut self, button: JoypadButton) {
        self.joypad.release_button(button);
    }
}

impl Memory for Bus<'_> {
    fn read(&self, addr: Address) -> Byte {
        match addr {
            JOYPAD_REGISTER => self.joypad.read(),
            _ => self.memory[addr as usize],
        }
    }

    fn write(&mut self, addr: Address, value: Byte) {
        match addr {
            // MBC control writes land here on real cartridges; bank
            // switching is outside this core.
            0x0000..=ROM_END => {
                trace!("ignoring write of {value:#04x} to ROM area ({addr:#06x})");
            }
            JOYPAD_REGISTER => self.joypad.select(value),
            INTERRUPT_FLAG => self.memory[addr as usize] = value & interrupts::INTERRUPT_BITS,
            _ => self.memory[addr as usize] = value,
        }
    }
}
