//! Tiny 5x7 bitmap font for burning labels into frames.
//!
//! Only the characters used by the overlay label are defined; anything else
//! renders as a blank cell.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
/// Horizontal advance per character, in font pixels.
const ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Rows top to bottom, bit 4 is the leftmost column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'Δ' => [0x04, 0x04, 0x0A, 0x0A, 0x11, 0x11, 0x1F],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        'v' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x0A, 0x04],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        _ => [0x00; 7],
    }
}

/// Width in image pixels of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    (n * ADVANCE - 1) * scale
}

/// Draw `text` with its top-left corner at `(x, y)`. Clipped to the canvas.
pub fn draw_text(canvas: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let step = scale as i32;
    for (idx, c) in text.chars().enumerate() {
        let origin_x = x + (idx as u32 * ADVANCE) as i32 * step;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = origin_x + col as i32 * step;
                let py = y + row as i32 * step;
                draw_filled_rect_mut(canvas, Rect::at(px, py).of_size(scale, scale), color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_characters_defined() {
        for c in "ΔT:+-0123456789.s()Bv A".chars().filter(|c| *c != ' ') {
            assert!(glyph(c).iter().any(|row| *row != 0), "missing glyph {:?}", c);
        }
    }

    #[test]
    fn test_draw_stays_inside_text_box() {
        let mut canvas = RgbImage::new(100, 40);
        let green = Rgb([0, 255, 0]);
        draw_text(&mut canvas, "1.5", 2, 3, 2, green);

        let width = text_width("1.5", 2);
        for (x, y, p) in canvas.enumerate_pixels() {
            if *p == green {
                assert!(x >= 2 && x < 2 + width, "x = {}", x);
                assert!(y >= 3 && y < 3 + GLYPH_HEIGHT * 2, "y = {}", y);
            }
        }
        assert!(canvas.pixels().any(|p| *p == green));
    }

    #[test]
    fn test_draw_clips_at_edges() {
        let mut canvas = RgbImage::new(10, 10);
        draw_text(&mut canvas, "88", 6, 6, 3, Rgb([255, 0, 0]));
        draw_text(&mut canvas, "8", -20, -20, 1, Rgb([255, 0, 0]));
    }
}
