use crate::Byte;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JoypadButton: Byte {
        const RIGHT    = 0b0000_0001;
        const LEFT     = 0b0000_0010;
        const UP       = 0b0000_0100;
        const DOWN     = 0b0000_1000;
        const BUTTON_A = 0b0001_0000;
        const BUTTON_B = 0b0010_0000;
        const SELECT   = 0b0100_0000;
        const START    = 0b1000_0000;
    }
}

const SELECT_DIRECTIONS: Byte = 0b0001_0000;
const SELECT_ACTIONS: Byte = 0b0010_0000;

/// The JOYP (0xFF00) matrix: the CPU writes two active-low select bits,
/// then reads the four button lines of the selected group, also active
/// low. Press/release is the seam for an external input collaborator.
#[derive(Debug, Default)]
pub struct Joypad {
    select: Byte,
    pressed: JoypadButton,
}

impl Joypad {
    /// CPU write to JOYP: only the select bits stick.
    pub fn select(&mut self, value: Byte) {
        self.select = value & (SELECT_DIRECTIONS | SELECT_ACTIONS);
    }

    /// CPU read of JOYP: pressed buttons of a selected group pull their
    /// line low; the unused top bits read as 1.
    pub fn read(&self) -> Byte {
        let mut lines = 0x0f;

        if self.select & SELECT_DIRECTIONS == 0 {
            lines &= !(self.pressed.bits() & 0x0f);
        }
        if self.select & SELECT_ACTIONS == 0 {
            lines &= !(self.pressed.bits() >> 4);
        }

        0b1100_0000 | self.select | lines
    }

    /// Returns true on the released-to-pressed edge, the event that
    /// raises the joypad interrupt.
    pub fn press_button(&mut self, button: JoypadButton) -> bool {
        let newly_pressed = !self.pressed.contains(button);
        self.pressed.insert(button);

        newly_pressed
    }

    pub fn release_button(&mut self, button: JoypadButton) {
        self.pressed.remove(button);
    }
}
