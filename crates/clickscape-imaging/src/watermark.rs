//! Centre watermark for free-plan processed copies

use crate::error::DerivationError;
use crate::glyphs::{draw_text, text_size, GLYPH_HEIGHT};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Default text mark
pub const DEFAULT_WATERMARK_TEXT: &str = "ClickScapeIndia";

/// Logo width as a fraction of the image's shorter side
const LOGO_FRACTION: f64 = 0.35;
const LOGO_MIN_WIDTH: u32 = 96;
const LOGO_OPACITY: f64 = 0.6;

/// Text height as a fraction of the image's shorter side
const TEXT_FRACTION: f64 = 0.10;
const TEXT_MIN_HEIGHT: u32 = 24;
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 160]);
const FILL: Rgba<u8> = Rgba([255, 255, 255, 210]);

/// The mark stamped on processed copies
#[derive(Debug, Clone)]
pub enum Watermark {
    /// Alpha-composited logo
    Logo(Arc<RgbaImage>),
    /// Bitmap text with a drop shadow
    Text(String),
}

impl Default for Watermark {
    fn default() -> Self {
        Self::Text(DEFAULT_WATERMARK_TEXT.to_string())
    }
}

impl Watermark {
    /// Load a logo from disk
    ///
    /// # Errors
    /// Returns error if the file is missing or not a decodable image
    pub fn load_logo(path: &Path) -> Result<Self, DerivationError> {
        let logo = image::open(path).map_err(|source| DerivationError::Logo {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::Logo(Arc::new(logo.to_rgba8())))
    }

    /// Stamp the mark at the centre of `image`
    pub fn apply(&self, image: &mut RgbaImage) {
        match self {
            Self::Logo(logo) => apply_logo(image, logo),
            Self::Text(text) => apply_text(image, text),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn scaled(base: u32, fraction: f64, min: u32) -> u32 {
    ((f64::from(base) * fraction) as u32).max(min)
}

fn centre_offset(outer: u32, inner: u32) -> i64 {
    (i64::from(outer) - i64::from(inner)) / 2
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn apply_logo(image: &mut RgbaImage, logo: &RgbaImage) {
    if logo.width() == 0 || logo.height() == 0 {
        return;
    }
    let base = image.width().min(image.height());
    let target_w = scaled(base, LOGO_FRACTION, LOGO_MIN_WIDTH);
    let scale = f64::from(target_w) / f64::from(logo.width());
    let target_h = ((f64::from(logo.height()) * scale) as u32).max(1);

    let mut mark = imageops::resize(logo, target_w, target_h, FilterType::Lanczos3);
    for pixel in mark.pixels_mut() {
        pixel.0[3] = (f64::from(pixel.0[3]) * LOGO_OPACITY) as u8;
    }

    let x = centre_offset(image.width(), mark.width());
    let y = centre_offset(image.height(), mark.height());
    imageops::overlay(image, &mark, x, y);
    debug!(width = target_w, height = target_h, "applied centred logo watermark");
}

/// Pixels per glyph bit, so glyphs are at least the target text height
fn text_scale(base: u32) -> u32 {
    scaled(base, TEXT_FRACTION, TEXT_MIN_HEIGHT).div_ceil(GLYPH_HEIGHT)
}

/// Text wider than the image is clipped at its edges, never shrunk.
fn apply_text(image: &mut RgbaImage, text: &str) {
    let base = image.width().min(image.height());
    let height = scaled(base, TEXT_FRACTION, TEXT_MIN_HEIGHT);
    let scale = text_scale(base);

    let (text_w, text_h) = text_size(text, scale);
    let x = centre_offset(image.width(), text_w);
    let y = centre_offset(image.height(), text_h);
    let shadow = i64::from((height / 20).max(2));

    draw_text(image, text, x + shadow, y + shadow, scale, SHADOW);
    draw_text(image, text, x, y, scale, FILL);
    debug!(scale, "applied centred text watermark");
}
