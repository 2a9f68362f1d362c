//! Web compression and encoding of processed copies

use crate::error::DerivationError;
use clickscape_artifact::FileExt;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::DynamicImage;

/// Longest side of a web copy, pixels
pub const WEB_MAX_SIDE: u32 = 1600;
/// JPEG quality of a web copy
pub const WEB_QUALITY: u8 = 82;

/// Output container for a processed copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebFormat {
    Png,
    Jpeg,
}

impl WebFormat {
    /// Lossless sources stay PNG, everything else becomes JPEG
    #[must_use]
    pub fn for_source(ext: &FileExt) -> Self {
        match ext.as_str() {
            ".png" | ".webp" => Self::Png,
            _ => Self::Jpeg,
        }
    }

    #[must_use]
    pub fn ext(self) -> FileExt {
        match self {
            Self::Png => FileExt::parse("png"),
            Self::Jpeg => FileExt::parse("jpg"),
        }
    }
}

/// Scale down so neither side exceeds `max_side`. Never upscales.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn fit_within(image: DynamicImage, max_side: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return image;
    }
    let ratio = (f64::from(max_side) / f64::from(width))
        .min(f64::from(max_side) / f64::from(height))
        .min(1.0);
    if ratio >= 1.0 {
        return image;
    }
    let new_w = ((f64::from(width) * ratio) as u32).max(1);
    let new_h = ((f64::from(height) * ratio) as u32).max(1);
    image.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

/// [`fit_within`] at the standard web size
#[must_use]
pub fn compress_for_web(image: DynamicImage) -> DynamicImage {
    fit_within(image, WEB_MAX_SIDE)
}

/// Encode a processed copy; returns the bytes and their extension.
///
/// Alpha is flattened away; greyscale stays greyscale.
///
/// # Errors
/// Returns [`DerivationError::Encode`] if the encoder fails
pub fn encode_web(
    image: &DynamicImage,
    source_ext: &FileExt,
    quality: u8,
) -> Result<(Vec<u8>, FileExt), DerivationError> {
    let flattened = match image {
        DynamicImage::ImageLuma8(_) => image.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let format = WebFormat::for_source(source_ext);
    let mut out = Vec::new();
    match format {
        WebFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
            flattened
                .write_with_encoder(encoder)
                .map_err(DerivationError::Encode)?;
        }
        WebFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality);
            flattened
                .write_with_encoder(encoder)
                .map_err(DerivationError::Encode)?;
        }
    }
    Ok((out, format.ext()))
}
