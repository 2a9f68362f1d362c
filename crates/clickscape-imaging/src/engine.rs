//! Derivation engine
//!
//! Turns an accepted upload into its artifacts according to the plan's
//! [`UploadRules`]:
//!
//! - watermarking plans: decode, stamp, fit for web, re-encode. No original
//!   is kept, and an undecodable upload is an error so nothing leaves the
//!   pipeline unmarked.
//! - original-retaining plans: keep the upload byte for byte, plus an
//!   unmarked web preview. Formats the decoder does not know (RAW, PSD)
//!   fall back to the raw bytes as their own preview.

use crate::compress::{encode_web, fit_within, WEB_MAX_SIDE, WEB_QUALITY};
use crate::error::DerivationError;
use crate::watermark::{Watermark, DEFAULT_WATERMARK_TEXT};
use clickscape_artifact::{Artifact, FileExt, ImageBlob, OriginalImage, ProcessedImage};
use clickscape_plan::UploadRules;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Derivation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingConfig {
    /// PNG logo to composite; the text mark is used when unset
    pub watermark_logo: Option<PathBuf>,
    /// Text mark
    pub watermark_text: String,
    /// Longest side of web copies
    pub web_max_side: u32,
    /// JPEG quality of web copies
    pub web_quality: u8,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            watermark_logo: None,
            watermark_text: DEFAULT_WATERMARK_TEXT.to_string(),
            web_max_side: WEB_MAX_SIDE,
            web_quality: WEB_QUALITY,
        }
    }
}

/// Artifacts derived from one upload
#[derive(Debug, Clone)]
pub struct Derivation {
    pub processed: Artifact<ProcessedImage>,
    pub original: Option<Artifact<OriginalImage>>,
    /// Processed copy carries the watermark
    pub watermarked: bool,
    /// Processed copy is the raw upload because it could not be decoded
    pub raw_preview: bool,
}

/// Stateless apart from its settings; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DerivationEngine {
    watermark: Watermark,
    max_side: u32,
    quality: u8,
}

impl Default for DerivationEngine {
    fn default() -> Self {
        Self {
            watermark: Watermark::default(),
            max_side: WEB_MAX_SIDE,
            quality: WEB_QUALITY,
        }
    }
}

impl DerivationEngine {
    /// Build from settings. A configured logo that cannot be loaded is an
    /// error rather than a silent switch to the text mark.
    ///
    /// # Errors
    /// Returns [`DerivationError::Logo`] if the logo cannot be loaded
    pub fn from_config(config: &ImagingConfig) -> Result<Self, DerivationError> {
        let watermark = match &config.watermark_logo {
            Some(path) => Watermark::load_logo(path)?,
            None => Watermark::Text(config.watermark_text.clone()),
        };
        Ok(Self {
            watermark,
            max_side: config.web_max_side.max(1),
            quality: config.web_quality.clamp(1, 100),
        })
    }

    #[must_use]
    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = watermark;
        self
    }

    /// Stamp the configured mark at the centre of `image`
    pub fn apply_watermark(&self, image: &mut image::RgbaImage) {
        self.watermark.apply(image);
    }

    /// Derive the artifacts for one upload
    ///
    /// # Errors
    /// Returns error if a watermarking plan's upload cannot be decoded, or
    /// encoding fails
    pub fn derive(
        &self,
        rules: &UploadRules,
        bytes: Arc<[u8]>,
        ext: &FileExt,
    ) -> Result<Derivation, DerivationError> {
        let original = if rules.retain_original {
            Some(Artifact::<OriginalImage>::new(ImageBlob::new(
                Arc::clone(&bytes),
                ext.clone(),
            ))?)
        } else {
            None
        };

        if rules.watermark {
            let image = image::load_from_memory(&bytes).map_err(|source| DerivationError::Decode {
                ext: ext.clone(),
                source,
            })?;
            let mut canvas = image.to_rgba8();
            self.apply_watermark(&mut canvas);
            let processed = self.web_copy(DynamicImage::ImageRgba8(canvas), ext)?;
            return Ok(Derivation {
                processed,
                original,
                watermarked: true,
                raw_preview: false,
            });
        }

        match image::load_from_memory(&bytes) {
            Ok(image) => Ok(Derivation {
                processed: self.web_copy(image, ext)?,
                original,
                watermarked: false,
                raw_preview: false,
            }),
            Err(e) => {
                warn!(ext = %ext, error = %e, "cannot decode upload, serving raw bytes as preview");
                let processed = Artifact::<ProcessedImage>::new(ImageBlob::new(bytes, ext.clone()))?;
                Ok(Derivation {
                    processed,
                    original,
                    watermarked: false,
                    raw_preview: true,
                })
            }
        }
    }

    /// [`Self::derive`] on the blocking pool
    ///
    /// # Errors
    /// Same as [`Self::derive`], plus [`DerivationError::Join`]
    pub async fn derive_blocking(
        self: Arc<Self>,
        rules: UploadRules,
        bytes: Arc<[u8]>,
        ext: FileExt,
    ) -> Result<Derivation, DerivationError> {
        tokio::task::spawn_blocking(move || self.derive(&rules, bytes, &ext)).await?
    }

    fn web_copy(
        &self,
        image: DynamicImage,
        ext: &FileExt,
    ) -> Result<Artifact<ProcessedImage>, DerivationError> {
        let fitted = fit_within(image, self.max_side);
        let (bytes, out_ext) = encode_web(&fitted, ext, self.quality)?;
        debug!(
            width = fitted.width(),
            height = fitted.height(),
            bytes = bytes.len(),
            ext = %out_ext,
            "encoded web copy"
        );
        Ok(Artifact::new(ImageBlob::new(bytes, out_ext))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickscape_plan::{Plan, RuleResolver};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Arc<[u8]> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, format).unwrap();
        out.into_inner().into()
    }

    #[test]
    fn free_upload_is_watermarked_and_not_retained() {
        let resolver = RuleResolver::default();
        let engine = DerivationEngine::default();
        let bytes = encoded(800, 600, ImageFormat::Jpeg);

        let derived = engine
            .derive(resolver.rules_for(Plan::Free), bytes, &FileExt::parse("jpg"))
            .unwrap();
        assert!(derived.watermarked);
        assert!(derived.original.is_none());
        assert_eq!(derived.processed.content().ext().as_str(), ".jpg");
        assert!(derived.processed.verify());
    }

    #[test]
    fn free_upload_png_stays_png() {
        let resolver = RuleResolver::default();
        let engine = DerivationEngine::default();
        let bytes = encoded(120, 80, ImageFormat::Png);
        let derived = engine
            .derive(resolver.rules_for(Plan::Free), bytes, &FileExt::parse("png"))
            .unwrap();
        assert_eq!(derived.processed.content().ext().as_str(), ".png");
    }

    #[test]
    fn free_upload_that_does_not_decode_is_rejected() {
        let resolver = RuleResolver::default();
        let engine = DerivationEngine::default();
        let result = engine.derive(
            resolver.rules_for(Plan::Free),
            Arc::from(&b"definitely not a jpeg"[..]),
            &FileExt::parse("jpg"),
        );
        assert!(matches!(result, Err(DerivationError::Decode { .. })));
    }

    #[test]
    fn premium_keeps_original_bytes() {
        let resolver = RuleResolver::default();
        let engine = DerivationEngine::default();
        let bytes = encoded(2000, 1000, ImageFormat::Png);

        let derived = engine
            .derive(
                resolver.rules_for(Plan::Premium),
                Arc::clone(&bytes),
                &FileExt::parse("png"),
            )
            .unwrap();
        let original = derived.original.expect("premium keeps the original");
        assert_eq!(original.content().bytes(), &bytes[..]);
        assert!(!derived.watermarked);

        let preview = image::load_from_memory(derived.processed.content().bytes()).unwrap();
        assert_eq!(preview.width(), 1600);
        assert_eq!(preview.height(), 800);
    }

    #[test]
    fn premium_raw_falls_back_to_raw_preview() {
        let resolver = RuleResolver::default();
        let engine = DerivationEngine::default();
        let raw: Arc<[u8]> = Arc::from(&b"II*\0raw sensor dump"[..]);

        let derived = engine
            .derive(
                resolver.rules_for(Plan::Premium),
                Arc::clone(&raw),
                &FileExt::parse("raw"),
            )
            .unwrap();
        assert!(derived.raw_preview);
        assert_eq!(derived.processed.content().bytes(), &raw[..]);
        assert_eq!(derived.processed.content().ext().as_str(), ".raw");
        assert_eq!(derived.original.unwrap().hash(), derived.processed.hash());
    }

    #[test]
    fn missing_logo_is_a_config_error() {
        let config = ImagingConfig {
            watermark_logo: Some(PathBuf::from("/nope/logo.png")),
            ..ImagingConfig::default()
        };
        assert!(DerivationEngine::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn derive_blocking_matches_derive() {
        let resolver = RuleResolver::default();
        let engine = Arc::new(DerivationEngine::default());
        let bytes = encoded(64, 64, ImageFormat::Jpeg);
        let rules = resolver.rules_for(Plan::Premium).clone();

        let derived = Arc::clone(&engine)
            .derive_blocking(rules, Arc::clone(&bytes), FileExt::parse("jpg"))
            .await
            .unwrap();
        assert_eq!(derived.original.unwrap().content().bytes(), &bytes[..]);
    }
}
