mod config;

use crate::config::Config;
use clap::Parser;
use log::{error, info};
use sabi_gb_core::interrupts::INTERRUPT_BITS;
use sabi_gb_core::render::Frame;
use sabi_gb_core::{Bus, Cpu, Result};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

const SHADES: [char; 4] = [' ', '.', 'o', '#'];

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::parse();

    let rom = std::fs::read(&config.rom_path)?;
    info!(
        "loaded {} bytes from {}",
        rom.len(),
        config.rom_path.display()
    );

    let frames = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&frames);

    let dump_last_frame = config.dump_last_frame;
    let snapshot = Rc::new(RefCell::new(Vec::new()));
    let snapshot_writer = Rc::clone(&snapshot);

    let mut bus = Bus::new_with_callback(move |frame: &Frame| {
        counter.set(counter.get() + 1);

        if dump_last_frame {
            snapshot_writer.borrow_mut().clone_from(&frame.data);
        }

        Ok(())
    });
    bus.load_rom(&rom);

    let mut cpu = Cpu::new(bus);
    cpu.on_fault(|fault| error!("cpu fault: {fault}"));

    while frames.get() < config.frames {
        if cpu.halted && cpu.bus.interrupt_enable() & INTERRUPT_BITS == 0 {
            info!("cpu halted with all interrupts disabled; stopping");
            break;
        }

        // a fault has already been reported through the observer
        if cpu.step().is_err() {
            break;
        }
    }

    info!("emulated {} frame(s)", frames.get());

    if dump_last_frame {
        for row in snapshot.borrow().chunks(Frame::WIDTH) {
            let line: String = row.iter().map(|shade| SHADES[usize::from(*shade)]).collect();
            println!("{line}");
        }
    }

    Ok(())
}
