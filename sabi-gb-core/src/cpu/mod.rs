mod flags_register;
mod memory;
pub mod opcodes;
mod registers;

pub use flags_register::FlagsRegister;
pub use memory::Memory;
pub use registers::Registers;

use crate::bus::Bus;
use crate::cpu::opcodes::{Opcode, OPCODES_MAPPING};
use crate::interrupts;
use crate::utils::NthBit;
use crate::{Byte, Error, Result};
use log::{trace, warn};
use std::fmt;

pub type Address = u16;

/// Cycles charged while the CPU sits in the halt state; the bus keeps
/// ticking so an enabled interrupt can eventually wake it.
const HALT_IDLE_CYCLES: u8 = 4;

/// An opcode byte with no entry in the dispatch table. Surfaced as a
/// typed error so callers can downcast it out of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndefinedOpcode {
    pub code: Byte,
    pub address: Address,
}

impl fmt::Display for UndefinedOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "undefined opcode {:#04x} at {:#06x}",
            self.code, self.address
        )
    }
}

impl std::error::Error for UndefinedOpcode {}

pub struct Cpu<'call> {
    pub registers: Registers,
    pub halted: bool,
    pub interrupt_master_enable: bool,
    pub bus: Bus<'call>,

    fault_observer: Option<Box<dyn FnMut(&UndefinedOpcode) + 'call>>,
}

impl Memory for Cpu<'_> {
    fn read(&self, addr: Address) -> Byte {
        self.bus.read(addr)
    }

    fn write(&mut self, addr: Address, value: Byte) {
        self.bus.write(addr, value);
    }
}

impl<'call> Cpu<'call> {
    pub fn new(bus: Bus<'call>) -> Self {
        Self {
            registers: Registers::post_boot(),
            halted: false,
            interrupt_master_enable: true,
            bus,
            fault_observer: None,
        }
    }

    /// Installs a passive observer for undefined-opcode faults. The
    /// fault is still returned from `step`; observing it does not alter
    /// control flow.
    pub fn on_fault<F>(&mut self, observer: F)
    where
        F: FnMut(&UndefinedOpcode) + 'call,
    {
        self.fault_observer = Some(Box::new(observer));
    }

    /// Runs until the CPU halts with every interrupt source disabled
    /// (nothing left that could wake it) or a fault surfaces.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.halted && self.bus.interrupt_enable() & interrupts::INTERRUPT_BITS == 0 {
                return Ok(());
            }

            self.step()?;
        }
    }

    /// Executes one instruction (or one interrupt dispatch, or one idle
    /// halt period) and advances the bus clock by its cycle cost.
    pub fn step(&mut self) -> Result<u8> {
        if let Some(cycles) = self.poll_interrupts() {
            self.bus.tick(cycles)?;
            return Ok(cycles);
        }

        if self.halted {
            self.bus.tick(HALT_IDLE_CYCLES)?;
            return Ok(HALT_IDLE_CYCLES);
        }

        let address = self.registers.pc;
        let code = self.fetch_byte();

        let Some(&opcode) = OPCODES_MAPPING.get(&code) else {
            let fault = UndefinedOpcode { code, address };

            // Leave PC on the faulting byte so nothing decodes past it.
            self.registers.pc = address;
            self.halted = true;
            warn!("{fault}");

            if let Some(observer) = self.fault_observer.as_mut() {
                observer(&fault);
            }

            return Err(Error::new(fault));
        };

        let cycles = self.execute(opcode);
        self.bus.tick(cycles)?;

        Ok(cycles)
    }

    /// Checks IF against IE. Any pending, enabled interrupt wakes a
    /// halted CPU; a dispatch additionally requires the master enable
    /// and services exactly one source, lowest bit first.
    fn poll_interrupts(&mut self) -> Option<u8> {
        let pending = self.bus.interrupt_flag() & self.bus.interrupt_enable();
        if pending == 0 {
            return None;
        }

        self.halted = false;

        if !self.interrupt_master_enable {
            return None;
        }

        let interrupt = interrupts::PRIORITY_ORDER
            .iter()
            .find(|interrupt| pending & interrupt.mask != 0)?;

        self.bus
            .set_interrupt_flag(self.bus.interrupt_flag() & !interrupt.mask);
        self.interrupt_master_enable = false;
        self.push_word(self.registers.pc);
        self.registers.pc = interrupt.vector_addr;
        trace!(
            "dispatched {:?} interrupt to {:#04x}",
            interrupt.kind, interrupt.vector_addr
        );

        Some(interrupt.cpu_cycles)
    }

    fn fetch_byte(&mut self) -> Byte {
        let value = self.read(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);

        value
    }

    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte();
        let hi = self.fetch_byte();

        u16::from_le_bytes([lo, hi])
    }

    /// Reads the register operand encoded in the low three bits of most
    /// opcodes: B, C, D, E, H, L, (HL), A.
    fn read_operand(&self, index: Byte) -> Byte {
        match index & 0b111 {
            0 => self.registers.b,
            1 => self.registers.c,
            2 => self.registers.d,
            3 => self.registers.e,
            4 => self.registers.h,
            5 => self.registers.l,
            6 => self.read(self.registers.hl()),
            _ => self.registers.a,
        }
    }

    fn write_operand(&mut self, index: Byte, value: Byte) {
        match index & 0b111 {
            0 => self.registers.b = value,
            1 => self.registers.c = value,
            2 => self.registers.d = value,
            3 => self.registers.e = value,
            4 => self.registers.h = value,
            5 => self.registers.l = value,
            6 => self.write(self.registers.hl(), value),
            _ => self.registers.a = value,
        }
    }

    /// BC, DE, HL, SP selected by bits 4-5 of the opcode.
    fn read_pair(&self, selector: Byte) -> u16 {
        match selector & 0b11 {
            0 => self.registers.bc(),
            1 => self.registers.de(),
            2 => self.registers.hl(),
            _ => self.registers.sp,
        }
    }

    fn write_pair(&mut self, selector: Byte, value: u16) {
        match selector & 0b11 {
            0 => self.registers.set_bc(value),
            1 => self.registers.set_de(value),
            2 => self.registers.set_hl(value),
            _ => self.registers.sp = value,
        }
    }

    /// NZ, Z, NC, C selected by bits 3-4 of the opcode.
    fn condition(&self, code: Byte) -> bool {
        let flags = self.registers.flags;

        match (code >> 3) & 0b11 {
            0 => !flags.contains(FlagsRegister::ZERO),
            1 => flags.contains(FlagsRegister::ZERO),
            2 => !flags.contains(FlagsRegister::CARRY),
            _ => flags.contains(FlagsRegister::CARRY),
        }
    }

    fn execute(&mut self, opcode: &Opcode) -> u8 {
        let code = opcode.code;

        match code {
            0x00 => {} // NOP
            0x10 => {
                // STOP: the pad byte is fetched and ignored; treated as
                // a halt, like the hardware with no wake source wired.
                let _pad = self.fetch_byte();
                self.halted = true;
            }
            0x76 => self.halted = true, // HALT
            0xf3 => self.interrupt_master_enable = false, // DI
            0xfb => self.interrupt_master_enable = true,  // EI
            0xcb => return self.execute_cb(),

            // 16-bit loads
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch_word();
                self.write_pair(code >> 4, value);
            }
            0x08 => {
                let addr = self.fetch_word();
                self.write_u16(addr, self.registers.sp);
            }
            0xf8 => {
                let value = self.add_to_sp();
                self.registers.set_hl(value);
            }
            0xf9 => self.registers.sp = self.registers.hl(),
            0xc1 | 0xd1 | 0xe1 => {
                let value = self.pop_word();
                self.write_pair(code >> 4, value);
            }
            0xf1 => {
                let value = self.pop_word();
                self.registers.set_af(value);
            }
            0xc5 | 0xd5 | 0xe5 => self.push_word(self.read_pair(code >> 4)),
            0xf5 => self.push_word(self.registers.af()),

            // 8-bit immediate loads (LD r,d8 / LD (HL),d8)
            0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x36 | 0x3e => {
                let value = self.fetch_byte();
                self.write_operand(code >> 3, value);
            }

            // loads through register pairs
            0x02 => self.write(self.registers.bc(), self.registers.a),
            0x12 => self.write(self.registers.de(), self.registers.a),
            0x22 => {
                let hl = self.registers.hl();
                self.write(hl, self.registers.a);
                self.registers.set_hl(hl.wrapping_add(1));
            }
            0x32 => {
                let hl = self.registers.hl();
                self.write(hl, self.registers.a);
                self.registers.set_hl(hl.wrapping_sub(1));
            }
            0x0a => self.registers.a = self.read(self.registers.bc()),
            0x1a => self.registers.a = self.read(self.registers.de()),
            0x2a => {
                let hl = self.registers.hl();
                self.registers.a = self.read(hl);
                self.registers.set_hl(hl.wrapping_add(1));
            }
            0x3a => {
                let hl = self.registers.hl();
                self.registers.a = self.read(hl);
                self.registers.set_hl(hl.wrapping_sub(1));
            }

            // absolute / high-page loads
            0xe0 => {
                let offset = self.fetch_byte();
                self.write(0xff00 + Address::from(offset), self.registers.a);
            }
            0xf0 => {
                let offset = self.fetch_byte();
                self.registers.a = self.read(0xff00 + Address::from(offset));
            }
            0xe2 => self.write(0xff00 + Address::from(self.registers.c), self.registers.a),
            0xf2 => self.registers.a = self.read(0xff00 + Address::from(self.registers.c)),
            0xea => {
                let addr = self.fetch_word();
                self.write(addr, self.registers.a);
            }
            0xfa => {
                let addr = self.fetch_word();
                self.registers.a = self.read(addr);
            }

            // 16-bit arithmetic (no flags on plain INC/DEC)
            0x03 | 0x13 | 0x23 | 0x33 => {
                let value = self.read_pair(code >> 4).wrapping_add(1);
                self.write_pair(code >> 4, value);
            }
            0x0b | 0x1b | 0x2b | 0x3b => {
                let value = self.read_pair(code >> 4).wrapping_sub(1);
                self.write_pair(code >> 4, value);
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let value = self.read_pair(code >> 4);
                self.add_hl(value);
            }
            0xe8 => self.registers.sp = self.add_to_sp(),

            // 8-bit inc/dec
            0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x34 | 0x3c => {
                self.increment_operand(code >> 3);
            }
            0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x35 | 0x3d => {
                self.decrement_operand(code >> 3);
            }

            // accumulator rotates (Z always cleared, unlike the CB forms)
            0x07 => {
                let result = self.rotate_left_circular(self.registers.a);
                self.registers.a = result;
                self.registers.flags.set_zero_flag(false);
            }
            0x0f => {
                let result = self.rotate_right_circular(self.registers.a);
                self.registers.a = result;
                self.registers.flags.set_zero_flag(false);
            }
            0x17 => {
                let result = self.rotate_left(self.registers.a);
                self.registers.a = result;
                self.registers.flags.set_zero_flag(false);
            }
            0x1f => {
                let result = self.rotate_right(self.registers.a);
                self.registers.a = result;
                self.registers.flags.set_zero_flag(false);
            }

            0x27 => self.decimal_adjust(),
            0x2f => {
                self.registers.a = !self.registers.a;
                self.registers.flags.set_subtract_flag(true);
                self.registers.flags.set_half_carry_flag(true);
            }
            0x37 => {
                let flags = &mut self.registers.flags;
                flags.set_subtract_flag(false);
                flags.set_half_carry_flag(false);
                flags.set_carry_flag(true);
            }
            0x3f => {
                let flags = &mut self.registers.flags;
                let carry = flags.carry();
                flags.set_subtract_flag(false);
                flags.set_half_carry_flag(false);
                flags.set_carry_flag(!carry);
            }

            // relative jumps
            0x18 => self.jump_relative(true),
            0x20 | 0x28 | 0x30 | 0x38 => {
                let condition = self.condition(code);
                self.jump_relative(condition);
            }

            // register-to-register loads
            0x40..=0x75 | 0x77..=0x7f => {
                let value = self.read_operand(code);
                self.write_operand(code >> 3, value);
            }

            // the eight-operation ALU block
            0x80..=0xbf => {
                let value = self.read_operand(code);
                self.alu(code >> 3, value);
            }
            0xc6 | 0xce | 0xd6 | 0xde | 0xe6 | 0xee | 0xf6 | 0xfe => {
                let value = self.fetch_byte();
                self.alu(code >> 3, value);
            }

            // absolute jumps, calls, returns
            0xc3 => self.registers.pc = self.fetch_word(),
            0xc2 | 0xca | 0xd2 | 0xda => {
                let addr = self.fetch_word();
                if self.condition(code) {
                    self.registers.pc = addr;
                }
            }
            0xe9 => self.registers.pc = self.registers.hl(),
            0xcd => {
                let addr = self.fetch_word();
                self.push_word(self.registers.pc);
                self.registers.pc = addr;
            }
            0xc4 | 0xcc | 0xd4 | 0xdc => {
                let addr = self.fetch_word();
                if self.condition(code) {
                    self.push_word(self.registers.pc);
                    self.registers.pc = addr;
                }
            }
            0xc9 => self.registers.pc = self.pop_word(),
            0xc0 | 0xc8 | 0xd0 | 0xd8 => {
                if self.condition(code) {
                    self.registers.pc = self.pop_word();
                }
            }
            0xd9 => {
                // RETI
                self.registers.pc = self.pop_word();
                self.interrupt_master_enable = true;
            }

            // restarts: the vector is encoded in bits 3-5
            0xc7 | 0xcf | 0xd7 | 0xdf | 0xe7 | 0xef | 0xf7 | 0xff => {
                self.push_word(self.registers.pc);
                self.registers.pc = Address::from(code & 0b0011_1000);
            }

            _ => unreachable!("undefined opcodes never reach execute"),
        }

        opcode.cycles
    }

    /// Decodes a CB-prefixed operation: rotates/shifts in the first
    /// quadrant, then BIT, RES and SET with the bit index in bits 3-5.
    fn execute_cb(&mut self) -> u8 {
        let code = self.fetch_byte();
        let index = code & 0b111;
        let bit = (code >> 3) & 0b111;
        let value = self.read_operand(index);

        match code >> 6 {
            0b00 => {
                let result = match bit {
                    0 => self.rotate_left_circular(value),
                    1 => self.rotate_right_circular(value),
                    2 => self.rotate_left(value),
                    3 => self.rotate_right(value),
                    4 => self.shift_left_arithmetic(value),
                    5 => self.shift_right_arithmetic(value),
                    6 => self.swap_nibbles(value),
                    _ => self.shift_right_logical(value),
                };
                self.write_operand(index, result);
            }
            0b01 => {
                // BIT: tests only, carry untouched
                let flags = &mut self.registers.flags;
                flags.set_zero_flag(!value.nth_bit(bit));
                flags.set_subtract_flag(false);
                flags.set_half_carry_flag(true);
            }
            0b10 => self.write_operand(index, value & !(1 << bit)),
            _ => self.write_operand(index, value | 1 << bit),
        }

        match (index, code >> 6) {
            (6, 0b01) => 12,
            (6, _) => 16,
            _ => 8,
        }
    }

    /// ADD, ADC, SUB, SBC, AND, XOR, OR, CP selected by bits 3-5.
    fn alu(&mut self, operation: Byte, value: Byte) {
        match operation & 0b111 {
            0 => self.add(value, false),
            1 => self.add(value, true),
            2 => {
                let result = self.subtract(value, false);
                self.registers.a = result;
            }
            3 => {
                let result = self.subtract(value, true);
                self.registers.a = result;
            }
            4 => self.and(value),
            5 => self.xor(value),
            6 => self.or(value),
            _ => {
                // CP computes the flags and discards the difference
                self.subtract(value, false);
            }
        }
    }

    fn add(&mut self, value: Byte, with_carry: bool) {
        let a = self.registers.a;
        let carry = Byte::from(with_carry && self.registers.flags.carry());
        let result = u16::from(a) + u16::from(value) + u16::from(carry);

        self.registers.a = result as Byte;

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(result as Byte == 0);
        flags.set_subtract_flag(false);
        flags.set_half_carry_flag((a & 0x0f) + (value & 0x0f) + carry > 0x0f);
        flags.set_carry_flag(result > 0xff);
    }

    fn subtract(&mut self, value: Byte, with_carry: bool) -> Byte {
        let a = self.registers.a;
        let carry = Byte::from(with_carry && self.registers.flags.carry());
        let result = a.wrapping_sub(value).wrapping_sub(carry);

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(result == 0);
        flags.set_subtract_flag(true);
        flags.set_half_carry_flag((a & 0x0f) < (value & 0x0f) + carry);
        flags.set_carry_flag(u16::from(a) < u16::from(value) + u16::from(carry));

        result
    }

    fn and(&mut self, value: Byte) {
        self.registers.a &= value;
        let zero = self.registers.a == 0;

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(zero);
        flags.set_subtract_flag(false);
        flags.set_half_carry_flag(true);
        flags.set_carry_flag(false);
    }

    fn xor(&mut self, value: Byte) {
        self.registers.a ^= value;
        let zero = self.registers.a == 0;

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(zero);
        flags.set_subtract_flag(false);
        flags.set_half_carry_flag(false);
        flags.set_carry_flag(false);
    }

    fn or(&mut self, value: Byte) {
        self.registers.a |= value;
        let zero = self.registers.a == 0;

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(zero);
        flags.set_subtract_flag(false);
        flags.set_half_carry_flag(false);
        flags.set_carry_flag(false);
    }

    fn increment_operand(&mut self, index: Byte) {
        let value = self.read_operand(index);
        let result = value.wrapping_add(1);
        self.write_operand(index, result);

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(result == 0);
        flags.set_subtract_flag(false);
        flags.set_half_carry_flag(value & 0x0f == 0x0f);
    }

    fn decrement_operand(&mut self, index: Byte) {
        let value = self.read_operand(index);
        let result = value.wrapping_sub(1);
        self.write_operand(index, result);

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(result == 0);
        flags.set_subtract_flag(true);
        flags.set_half_carry_flag(value & 0x0f == 0);
    }

    fn add_hl(&mut self, value: u16) {
        let hl = self.registers.hl();
        let result = u32::from(hl) + u32::from(value);

        self.registers.set_hl(result as u16);

        let flags = &mut self.registers.flags;
        flags.set_subtract_flag(false);
        // Half-carry comes out of bit 11 here, not bit 15; Z is untouched.
        flags.set_half_carry_flag((hl & 0x0fff) + (value & 0x0fff) > 0x0fff);
        flags.set_carry_flag(result > 0xffff);
    }

    /// Shared by ADD SP,r8 and LD HL,SP+r8: signed offset, flags from
    /// the unsigned low-byte addition.
    fn add_to_sp(&mut self) -> u16 {
        let offset = self.fetch_byte() as i8;
        let sp = self.registers.sp;
        let low = offset as Byte;

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(false);
        flags.set_subtract_flag(false);
        flags.set_half_carry_flag((sp & 0x0f) as Byte + (low & 0x0f) > 0x0f);
        flags.set_carry_flag((sp & 0xff) + u16::from(low) > 0xff);

        sp.wrapping_add_signed(i16::from(offset))
    }

    fn decimal_adjust(&mut self) {
        let flags = self.registers.flags;
        let mut a = self.registers.a;
        let mut carry = flags.carry();

        if flags.contains(FlagsRegister::SUBTRACT) {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if flags.contains(FlagsRegister::HALF_CARRY) {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if flags.contains(FlagsRegister::HALF_CARRY) || a & 0x0f > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }

        self.registers.a = a;

        let flags = &mut self.registers.flags;
        flags.set_zero_flag(a == 0);
        flags.set_half_carry_flag(false);
        flags.set_carry_flag(carry);
    }

    fn rotate_left_circular(&mut self, value: Byte) -> Byte {
        let carry = value >> 7;
        let result = value << 1 | carry;
        self.set_shift_flags(result, carry == 1);

        result
    }

    fn rotate_right_circular(&mut self, value: Byte) -> Byte {
        let carry = value & 1;
        let result = value >> 1 | carry << 7;
        self.set_shift_flags(result, carry == 1);

        result
    }

    fn rotate_left(&mut self, value: Byte) -> Byte {
        let carry_in = Byte::from(self.registers.flags.carry());
        let result = value << 1 | carry_in;
        self.set_shift_flags(result, value.nth_bit(7));

        result
    }

    fn rotate_right(&mut self, value: Byte) -> Byte {
        let carry_in = Byte::from(self.registers.flags.carry());
        let result = carry_in << 7 | value >> 1;
        self.set_shift_flags(result, value.nth_bit(0));

        result
    }

    fn shift_left_arithmetic(&mut self, value: Byte) -> Byte {
        let result = value << 1;
        self.set_shift_flags(result, value.nth_bit(7));

        result
    }

    fn shift_right_arithmetic(&mut self, value: Byte) -> Byte {
        // Bit 7 is replicated into the vacated position.
        let result = value >> 1 | (value & 0x80);
        self.set_shift_flags(result, value.nth_bit(0));

        result
    }

    fn swap_nibbles(&mut self, value: Byte) -> Byte {
        let result = value.rotate_left(4);
        self.set_shift_flags(result, false);

        result
    }

    fn shift_right_logical(&mut self, value: Byte) -> Byte {
        let result = value >> 1;
        self.set_shift_flags(result, value.nth_bit(0));

        result
    }

    fn set_shift_flags(&mut self, result: Byte, carry: bool) {
        let flags = &mut self.registers.flags;
        flags.set_zero_flag(result == 0);
        flags.set_subtract_flag(false);
        flags.set_half_carry_flag(false);
        flags.set_carry_flag(carry);
    }

    fn jump_relative(&mut self, condition: bool) {
        let offset = self.fetch_byte() as i8;

        if condition {
            self.registers.pc = self.registers.pc.wrapping_add_signed(i16::from(offset));
        }
    }

    /// Pre-decrement push: high byte to [SP-1], low byte to [SP-2].
    fn push_word(&mut self, value: u16) {
        let [lo, hi] = value.to_le_bytes();

        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.write(self.registers.sp, hi);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.write(self.registers.sp, lo);
    }

    /// Post-increment pop: low byte from [SP], high byte from [SP+1].
    fn pop_word(&mut self) -> u16 {
        let lo = self.read(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);
        let hi = self.read(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);

        u16::from_le_bytes([lo, hi])
    }
}
