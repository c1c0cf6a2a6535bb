use sabi_gb_core::render::Frame;
use sabi_gb_core::{Bus, Cpu, Result};

use std::cell::Cell;
use std::rc::Rc;

mod common;

use common::ENTRY_POINT;

const FRAME_CYCLES: u32 = 154 * 456;

#[test]
fn cpu_driven_frames_reach_the_callback_once_each() -> Result<()> {
    let frames = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&frames);

    let mut bus = Bus::new_with_callback(move |frame: &Frame| {
        assert_eq!(frame.data.len(), Frame::WIDTH * Frame::HEIGHT);
        counter.set(counter.get() + 1);
        Ok(())
    });
    // JR -2: spin in place while the PPU runs
    let mut image = vec![0x00; ENTRY_POINT as usize];
    image.extend_from_slice(&[0x18, 0xfe]);
    bus.load_rom(&image);

    let mut cpu = Cpu::new(bus);

    let mut cycles = 0u32;
    while frames.get() < 2 {
        cycles += u32::from(cpu.step()?);
        assert!(cycles <= 3 * FRAME_CYCLES, "frames never completed");
    }

    assert_eq!(frames.get(), 2);
    // still spinning on the same instruction
    assert_eq!(cpu.registers.pc, ENTRY_POINT);
    // the V-blank request from the last frame is still pending (IE is
    // zero, so nothing dispatched or cleared it)
    assert_eq!(cpu.bus.interrupt_flag() & 0b1, 0b1);

    Ok(())
}

#[test]
fn vblank_wakes_a_halted_cpu_and_dispatches() -> Result<()> {
    let mut bus = Bus::new();
    // enable only the V-blank interrupt, then halt
    let mut image = vec![0x00; ENTRY_POINT as usize];
    image.extend_from_slice(&[
        0x3e, 0x01, // LD A,0x01
        0xea, 0xff, 0xff, // LD (0xffff),A
        0x76, // HALT
    ]);
    bus.load_rom(&image);

    let mut cpu = Cpu::new(bus);

    for _ in 0..3 {
        cpu.step()?;
    }
    assert!(cpu.halted);

    // idle through most of a frame, then the dispatch must land on the
    // V-blank service routine
    let mut cycles = 0u32;
    while cpu.halted {
        cycles += u32::from(cpu.step()?);
        assert!(cycles <= 2 * FRAME_CYCLES, "V-blank never fired");
    }

    assert_eq!(cpu.registers.pc, 0x40);
    assert!(!cpu.interrupt_master_enable);
    assert_eq!(cpu.bus.interrupt_flag() & 0b1, 0);

    Ok(())
}
