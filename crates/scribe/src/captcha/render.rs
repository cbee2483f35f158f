//! CAPTCHA image rendering (PNG).
//!
//! Glyphs are rasterized with a TrueType font when one is configured. Without
//! one, a built-in 5x7 bitmap font is used; it only has upper-case letters,
//! which is fine because answers are compared case-insensitively.

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use rand::Rng;
use rusttype::{Font, Scale, point};
use scribe_common::ScribeError;
use std::io::Cursor;

const HEIGHT: u32 = 50;
const CELL_WIDTH: u32 = 30;
const FONT_SIZE: f32 = 36.0;
const BACKGROUND: Rgb<u8> = Rgb([244, 244, 238]);

/// Renders challenge text to PNG bytes
pub struct CaptchaRenderer {
    font: Option<Font<'static>>,
}

impl CaptchaRenderer {
    pub fn new(font: Option<Font<'static>>) -> Self {
        Self { font }
    }

    /// Load the font at `path`, falling back to the bitmap font on failure
    pub fn from_font_path(path: &str) -> Self {
        let font = match std::fs::read(path) {
            Ok(bytes) => {
                let font = Font::try_from_vec(bytes);
                if font.is_none() {
                    tracing::warn!(path, "Font file is not a usable TrueType font");
                }
                font
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "CAPTCHA font not found, using bitmap glyphs");
                None
            }
        };
        Self { font }
    }

    /// Render `text` with noise dots, jittered glyphs, and interference lines
    pub fn render(&self, text: &str) -> Result<Vec<u8>, ScribeError> {
        let mut rng = rand::rng();
        let count = text.chars().count() as u32;
        let width = CELL_WIDTH * (count + 1);
        let mut img = RgbImage::from_pixel(width, HEIGHT, BACKGROUND);

        for _ in 0..(width * HEIGHT / 40) {
            let center = (
                rng.random_range(0..width as i32),
                rng.random_range(0..HEIGHT as i32),
            );
            draw_filled_circle_mut(&mut img, center, 1, random_color(&mut rng, 120, 220));
        }

        for (i, c) in text.chars().enumerate() {
            let x = (CELL_WIDTH / 2 + CELL_WIDTH * i as u32) as f32 + rng.random_range(-3.0..3.0);
            let y = rng.random_range(2.0..8.0);
            let color = random_color(&mut rng, 10, 110);

            match &self.font {
                Some(font) => draw_font_glyph(&mut img, font, c, x, y, color),
                None => draw_bitmap_glyph(&mut img, c, x as i32, y as i32 + 2, color),
            }
        }

        for _ in 0..4 {
            let start = (0.0, rng.random_range(0.0..HEIGHT as f32));
            let end = (width as f32, rng.random_range(0.0..HEIGHT as f32));
            draw_line_segment_mut(&mut img, start, end, random_color(&mut rng, 60, 160));
        }

        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| ScribeError::Internal(format!("PNG encoding failed: {}", e)))?;
        Ok(bytes)
    }
}

fn random_color(rng: &mut impl Rng, low: u8, high: u8) -> Rgb<u8> {
    Rgb([
        rng.random_range(low..high),
        rng.random_range(low..high),
        rng.random_range(low..high),
    ])
}

fn put_blended(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
        return;
    }
    let pixel = img.get_pixel_mut(x as u32, y as u32);
    for k in 0..3 {
        let under = pixel.0[k] as f32;
        pixel.0[k] = (under + (color.0[k] as f32 - under) * coverage) as u8;
    }
}

fn draw_font_glyph(img: &mut RgbImage, font: &Font<'_>, c: char, x: f32, y: f32, color: Rgb<u8>) {
    let scale = Scale::uniform(FONT_SIZE);
    let ascent = font.v_metrics(scale).ascent;
    let glyph = font.glyph(c).scaled(scale).positioned(point(x, y + ascent));

    if let Some(bb) = glyph.pixel_bounding_box() {
        glyph.draw(|gx, gy, coverage| {
            put_blended(
                img,
                gx as i32 + bb.min.x,
                gy as i32 + bb.min.y,
                color,
                coverage,
            );
        });
    }
}

/// Size of one bitmap font dot, in pixels
const DOT: i32 = 5;

fn draw_bitmap_glyph(img: &mut RgbImage, c: char, x: i32, y: i32, color: Rgb<u8>) {
    let Some(rows) = bitmap(c) else {
        return;
    };
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..5 {
            if *bits & (0x10u8 >> col) == 0 {
                continue;
            }
            for dy in 0..DOT {
                for dx in 0..DOT {
                    put_blended(
                        img,
                        x + col * DOT + dx,
                        y + row as i32 * DOT + dy,
                        color,
                        1.0,
                    );
                }
            }
        }
    }
}

fn bitmap(c: char) -> Option<&'static [u8; 7]> {
    let c = c.to_ascii_uppercase();
    let index = match c {
        '0'..='9' => c as usize - '0' as usize,
        'A'..='Z' => 10 + c as usize - 'A' as usize,
        _ => return None,
    };
    GLYPHS.get(index)
}

/// 5x7 glyphs for 0-9 then A-Z, one byte per row, bit 4 is the leftmost column
const GLYPHS: [[u8; 7]; 36] = [
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
    [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
    [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
    [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
    [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
    [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
    [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
    [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
    [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
    [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
    [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
    [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
    [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
    [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
    [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
    [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
    [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
    [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
    [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
    [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
    [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
    [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
    [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
    [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
    [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
    [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
];
