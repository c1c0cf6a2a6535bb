mod frame;
mod sprite;

pub use frame::Frame;
pub use sprite::Sprite;

use crate::bus::{ADDRESS_SPACE_SIZE, SCROLL_X, SCROLL_Y};
use crate::render::sprite::MAX_SPRITES;
use crate::Byte;

const TILE_SIZE: usize = 8;
/// 8x8 pixels, two bit-planes, two bytes per row.
const TILE_BYTES: usize = 16;
const TILE_DATA_START: usize = 0x8000;
const BG_MAP_START: usize = 0x9800;
const BG_MAP_COLUMNS: usize = 32;

/// Hardware cap on sprites per scanline; entries past the tenth are
/// dropped in OAM order.
const MAX_SPRITES_PER_LINE: usize = 10;

/// Renders one finished scanline into the frame: background first, then
/// sprites on top. Invoked by the PPU at the drawing/H-blank boundary.
pub fn render_scanline(memory: &[Byte; ADDRESS_SPACE_SIZE], frame: &mut Frame, line: Byte) {
    render_background(memory, frame, line);
    render_sprites(memory, frame, line);
}

/// Walks the 160 pixels of a line through the scrolled 256x256
/// background space, wrapping modulo 256 in both axes, and stores the
/// raw 2-bit color number of each pixel.
fn render_background(memory: &[Byte; ADDRESS_SPACE_SIZE], frame: &mut Frame, line: Byte) {
    let scroll_y = memory[SCROLL_Y as usize];
    let scroll_x = memory[SCROLL_X as usize];

    let y = usize::from(scroll_y.wrapping_add(line));
    let tile_row = y / TILE_SIZE;

    for x in 0..Frame::WIDTH {
        let x_pos = usize::from(scroll_x.wrapping_add(x as Byte));
        let tile_col = x_pos / TILE_SIZE;

        let tile_index = memory[BG_MAP_START + tile_row * BG_MAP_COLUMNS + tile_col];
        let (plane0, plane1) = tile_row_planes(memory, tile_index, y % TILE_SIZE);

        let bit = (7 - x_pos % TILE_SIZE) as Byte;
        frame.set_pixel(x, usize::from(line), combine_planes(plane0, plane1, bit));
    }
}

/// Draws the sprites covering this line. The first ten covering OAM
/// entries are selected (hardware line cap); among those, the lower OAM
/// index wins overlaps, so they are painted in reverse selection order.
/// Color number 0 is transparent; the rest map through OBP0/OBP1.
fn render_sprites(memory: &[Byte; ADDRESS_SPACE_SIZE], frame: &mut Frame, line: Byte) {
    let mut selected = Vec::with_capacity(MAX_SPRITES_PER_LINE);

    for index in 0..MAX_SPRITES {
        let sprite = Sprite::from_oam(memory, index);

        if sprite.covers_line(line) {
            selected.push(sprite);

            if selected.len() == MAX_SPRITES_PER_LINE {
                break;
            }
        }
    }

    for sprite in selected.iter().rev() {
        let (plane0, plane1) = tile_row_planes(memory, sprite.tile_index, sprite.tile_row(line));
        let palette = memory[sprite.palette_addr() as usize];

        for column in 0..TILE_SIZE {
            let color = combine_planes(plane0, plane1, sprite.plane_bit(column));
            if color == 0 {
                continue;
            }

            let x = sprite.screen_x() + column as i16;
            if !(0..Frame::WIDTH as i16).contains(&x) {
                continue;
            }

            let shade = palette >> (color * 2) & 0b11;
            frame.set_pixel(x as usize, usize::from(line), shade);
        }
    }
}

fn tile_row_planes(memory: &[Byte; ADDRESS_SPACE_SIZE], tile_index: Byte, row: usize) -> (Byte, Byte) {
    let offset = TILE_DATA_START + usize::from(tile_index) * TILE_BYTES + row * 2;

    (memory[offset], memory[offset + 1])
}

fn combine_planes(plane0: Byte, plane1: Byte, bit: Byte) -> Byte {
    (plane1 >> bit & 1) << 1 | (plane0 >> bit & 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SPRITE_PALETTE_0, SPRITE_PALETTE_1};
    use crate::render::sprite::OAM_START;

    fn test_memory() -> Box<[Byte; ADDRESS_SPACE_SIZE]> {
        Box::new([0; ADDRESS_SPACE_SIZE])
    }

    fn place_sprite(memory: &mut [Byte; ADDRESS_SPACE_SIZE], index: usize, entry: [Byte; 4]) {
        let base = OAM_START as usize + index * 4;
        memory[base..base + 4].copy_from_slice(&entry);
    }

    /// Fills every row of a tile with the given bit-plane bytes.
    fn fill_tile(memory: &mut [Byte; ADDRESS_SPACE_SIZE], tile_index: usize, planes: (Byte, Byte)) {
        for row in 0..TILE_SIZE {
            let offset = TILE_DATA_START + tile_index * TILE_BYTES + row * 2;
            memory[offset] = planes.0;
            memory[offset + 1] = planes.1;
        }
    }

    #[test]
    fn zeroed_tiles_render_a_zero_scanline() {
        let memory = test_memory();
        let mut frame = Frame::default();

        render_scanline(&memory, &mut frame, 0);

        assert!((0..Frame::WIDTH).all(|x| frame.pixel(x, 0) == 0));
    }

    #[test]
    fn background_reads_color_numbers_from_both_planes() {
        let mut memory = test_memory();
        // tile 1 everywhere, both planes set: color number 3
        fill_tile(&mut memory, 1, (0xff, 0xff));
        for entry in 0..32 {
            memory[BG_MAP_START + entry] = 1;
        }

        let mut frame = Frame::default();
        render_background(&memory, &mut frame, 0);

        assert!((0..Frame::WIDTH).all(|x| frame.pixel(x, 0) == 3));
    }

    #[test]
    fn background_scroll_wraps_modulo_256() {
        let mut memory = test_memory();
        fill_tile(&mut memory, 1, (0xff, 0x00));
        // only the first map row holds tile 1
        for entry in 0..32 {
            memory[BG_MAP_START + entry] = 1;
        }
        // scrolled down by 255: line 1 lands back on background row 0
        memory[SCROLL_Y as usize] = 255;

        let mut frame = Frame::default();
        render_background(&memory, &mut frame, 1);

        assert_eq!(frame.pixel(0, 1), 1);
    }

    #[test]
    fn sprite_draws_through_its_palette_at_the_origin_offset() {
        let mut memory = test_memory();
        // tile 1, so the zeroed background keeps using blank tile 0
        fill_tile(&mut memory, 1, (0xff, 0xff));
        memory[SPRITE_PALETTE_0 as usize] = 0xff;
        // OAM y=16/x=8 is screen (0, 0)
        place_sprite(&mut memory, 0, [16, 8, 1, 0]);

        let mut frame = Frame::default();
        render_scanline(&memory, &mut frame, 0);

        assert!((0..8).all(|x| frame.pixel(x, 0) == 3));
        assert_eq!(frame.pixel(8, 0), 0);
    }

    #[test]
    fn sprite_color_zero_is_transparent() {
        let mut memory = test_memory();
        // plane bytes 0x0f: columns 0-3 are color 0, columns 4-7 color 3
        fill_tile(&mut memory, 1, (0x0f, 0x0f));
        memory[SPRITE_PALETTE_0 as usize] = 0xff;
        place_sprite(&mut memory, 0, [16, 8, 1, 0]);

        let mut frame = Frame::default();
        render_scanline(&memory, &mut frame, 0);

        assert_eq!(frame.pixel(0, 0), 0);
        assert_eq!(frame.pixel(4, 0), 3);
    }

    #[test]
    fn x_flip_mirrors_the_column_lookup() {
        let mut memory = test_memory();
        // plane 0 only, high nibble: columns 0-3 color 1 when unflipped
        fill_tile(&mut memory, 1, (0xf0, 0x00));
        memory[SPRITE_PALETTE_0 as usize] = 0b0000_0100; // color 1 -> shade 1
        place_sprite(&mut memory, 0, [16, 8, 1, 0b0010_0000]);

        let mut frame = Frame::default();
        render_scanline(&memory, &mut frame, 0);

        assert_eq!(frame.pixel(0, 0), 0);
        assert_eq!(frame.pixel(4, 0), 1);
    }

    #[test]
    fn y_flip_selects_the_mirrored_tile_row() {
        let mut memory = test_memory();
        // only row 0 of tile 1 is lit
        memory[TILE_DATA_START + TILE_BYTES] = 0xff;
        memory[SPRITE_PALETTE_0 as usize] = 0b0000_0100;
        place_sprite(&mut memory, 0, [16, 8, 1, 0b0100_0000]);

        let mut frame = Frame::default();
        // with Y-flip the lit row appears on the last sprite line
        render_scanline(&memory, &mut frame, 7);
        render_scanline(&memory, &mut frame, 0);

        assert_eq!(frame.pixel(0, 7), 1);
        assert_eq!(frame.pixel(0, 0), 0);
    }

    #[test]
    fn eleventh_sprite_on_a_line_is_dropped() {
        let mut memory = test_memory();
        fill_tile(&mut memory, 1, (0xff, 0xff));
        memory[SPRITE_PALETTE_0 as usize] = 0xff;

        // eleven sprites on line 0, at x = 8, 16, ... 88
        for index in 0..11 {
            place_sprite(&mut memory, index, [16, 8 + index as Byte * 8, 1, 0]);
        }

        let mut frame = Frame::default();
        render_scanline(&memory, &mut frame, 0);

        // the tenth sprite (index 9) lands at columns 72-79
        assert_eq!(frame.pixel(72, 0), 3);
        // the eleventh (index 10, columns 80-87) is dropped
        assert_eq!(frame.pixel(80, 0), 0);
    }

    #[test]
    fn lower_oam_index_wins_overlaps() {
        let mut memory = test_memory();
        fill_tile(&mut memory, 1, (0xff, 0xff));
        memory[SPRITE_PALETTE_0 as usize] = 0b1100_0000; // color 3 -> shade 3
        memory[SPRITE_PALETTE_1 as usize] = 0b0100_0000; // color 3 -> shade 1

        // same position; sprite 1 selects the other palette
        place_sprite(&mut memory, 0, [16, 8, 1, 0]);
        place_sprite(&mut memory, 1, [16, 8, 1, 0b0001_0000]);

        let mut frame = Frame::default();
        render_scanline(&memory, &mut frame, 0);

        assert_eq!(frame.pixel(0, 0), 3);
    }
}
