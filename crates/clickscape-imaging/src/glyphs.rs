//! 5x7 bitmap glyphs for the text watermark
//!
//! Rows run top to bottom; bit 4 is the leftmost column. Lowercase letters
//! render as uppercase and anything without a glyph renders as `?`.

use image::{Pixel, Rgba, RgbaImage};

pub(crate) const GLYPH_WIDTH: u32 = 5;
pub(crate) const GLYPH_HEIGHT: u32 = 7;
/// Blank columns between glyphs
pub(crate) const GLYPH_SPACING: u32 = 1;

const UNKNOWN: [u8; 7] = [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04];

fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
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
        ' ' => [0x00; 7],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => UNKNOWN,
    }
}

/// Pixel size of `text` drawn at `scale`
pub(crate) fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let n = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    if n == 0 {
        return (0, 0);
    }
    let columns = n
        .saturating_mul(GLYPH_WIDTH + GLYPH_SPACING)
        .saturating_sub(GLYPH_SPACING);
    (columns.saturating_mul(scale), GLYPH_HEIGHT.saturating_mul(scale))
}

/// Blend `text` onto `canvas` with its top-left corner at `(x, y)`.
///
/// Each glyph bit becomes a `scale`-sized block; blocks falling outside the
/// canvas are clipped.
pub(crate) fn draw_text(canvas: &mut RgbaImage, text: &str, x: i64, y: i64, scale: u32, color: Rgba<u8>) {
    let advance = i64::from((GLYPH_WIDTH + GLYPH_SPACING) * scale);
    let scale_i = i64::from(scale);
    let (width, height) = (i64::from(canvas.width()), i64::from(canvas.height()));

    for (index, c) in text.chars().enumerate() {
        let origin_x = x + advance * i64::try_from(index).unwrap_or(i64::MAX / 2);
        if origin_x >= width {
            break;
        }
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let block_x = origin_x + i64::from(col) * scale_i;
                let block_y = y + i64::try_from(row).unwrap_or(0) * scale_i;
                for py in block_y.max(0)..(block_y + scale_i).min(height) {
                    for px in block_x.max(0)..(block_x + scale_i).min(width) {
                        // Bounds were clamped to the canvas above.
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        canvas.get_pixel_mut(px as u32, py as u32).blend(&color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_size_accounts_for_spacing() {
        assert_eq!(text_size("", 3), (0, 0));
        assert_eq!(text_size("A", 1), (5, 7));
        assert_eq!(text_size("AB", 2), (22, 14));
    }

    #[test]
    fn lowercase_matches_uppercase() {
        assert_eq!(glyph('c'), glyph('C'));
        assert_eq!(glyph('~'), UNKNOWN);
    }

    #[test]
    fn draw_text_clips_at_edges() {
        let mut canvas = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        draw_text(&mut canvas, "HI", -3, -3, 2, Rgba([255, 255, 255, 255]));
        let lit = canvas.pixels().filter(|p| p.0[0] == 255).count();
        assert!(lit > 0);
        assert!(lit < 64);
    }
}
