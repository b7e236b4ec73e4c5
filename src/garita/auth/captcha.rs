//! Pixel-noise JPEG rendering for image challenge codes.
//!
//! The picture is a pure function of the code: the noise generator is seeded
//! from a digest of the code, so the same code always renders the same bytes.
//! It is a usability artifact, the secret lives in the challenge store.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::io::Cursor;

pub const IMAGE_WIDTH: u32 = 100;
pub const IMAGE_HEIGHT: u32 = 36;
const NOISE_LINES: usize = 155;
const NOISE_LINE_SPAN: u32 = 12;
const GLYPH_SCALE: u32 = 3;
const GLYPH_ADVANCE: u32 = 23;
const GLYPH_LEFT: u32 = 6;
const GLYPH_TOP: u32 = 8;

// 5x7 digit bitmaps, bit 4 is the leftmost column.
const DIGITS: [[u8; 7]; 10] = [
    [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
    [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
    [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
    [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
    [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
    [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
    [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
    [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
    [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
];

/// Render `code` into a JPEG. Non-digit characters are skipped.
///
/// # Errors
/// Returns an error if the JPEG encoder fails.
pub fn render(code: &str) -> Result<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed(code));

    let background = random_color(&mut rng, 200, 250);
    let mut canvas: RgbImage = ImageBuffer::from_pixel(IMAGE_WIDTH, IMAGE_HEIGHT, background);

    let noise = random_color(&mut rng, 160, 200);
    for _ in 0..NOISE_LINES {
        let x = rng.gen_range(0..IMAGE_WIDTH);
        let y = rng.gen_range(0..IMAGE_HEIGHT);
        let dx = rng.gen_range(0..NOISE_LINE_SPAN);
        let dy = rng.gen_range(0..NOISE_LINE_SPAN);
        draw_line(&mut canvas, (x, y), (x + dx, y + dy), noise);
    }

    for (index, digit) in (0u32..).zip(code.chars().filter_map(|c| c.to_digit(10))) {
        let color = random_color(&mut rng, 20, 130);
        let left = GLYPH_LEFT.saturating_add(GLYPH_ADVANCE.saturating_mul(index));
        draw_glyph(&mut canvas, &DIGITS[digit as usize], left, GLYPH_TOP, color);
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("failed to encode challenge image")?;
    Ok(bytes)
}

fn seed(code: &str) -> u64 {
    let digest = Sha256::digest(code.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn random_color(rng: &mut StdRng, low: u8, high: u8) -> Rgb<u8> {
    Rgb([
        rng.gen_range(low..high),
        rng.gen_range(low..high),
        rng.gen_range(low..high),
    ])
}

fn put_clipped(canvas: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, color);
    }
}

// Lines only ever run down and to the right.
fn draw_line(canvas: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.max(dy).max(1);
    for step in 0..=steps {
        let x = from.0 + dx * step / steps;
        let y = from.1 + dy * step / steps;
        put_clipped(canvas, x, y, color);
    }
}

fn draw_glyph(canvas: &mut RgbImage, glyph: &[u8; 7], left: u32, top: u32, color: Rgb<u8>) {
    for (row, bits) in (0u32..).zip(glyph.iter()) {
        for column in 0..5u32 {
            if bits & (0x10 >> column) == 0 {
                continue;
            }
            for sy in 0..GLYPH_SCALE {
                for sx in 0..GLYPH_SCALE {
                    put_clipped(
                        canvas,
                        left + column * GLYPH_SCALE + sx,
                        top + row * GLYPH_SCALE + sy,
                        color,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn render_produces_a_jpeg_of_the_expected_size() -> Result<()> {
        let bytes = render("4821")?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)?;
        assert_eq!(decoded.width(), IMAGE_WIDTH);
        assert_eq!(decoded.height(), IMAGE_HEIGHT);
        Ok(())
    }

    #[test]
    fn render_is_a_function_of_the_code() -> Result<()> {
        assert_eq!(render("4821")?, render("4821")?);
        assert_ne!(render("4821")?, render("1284")?);
        Ok(())
    }

    #[test]
    fn render_clips_long_codes() -> Result<()> {
        let bytes = render("0123456789")?;
        assert!(!bytes.is_empty());
        Ok(())
    }
}
