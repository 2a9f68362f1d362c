//! ClickScape Imaging
//!
//! The derivation engine: watermarking, web compression and re-encoding of
//! uploaded photos.
//!
//! # Example
//!
//! ```rust,ignore
//! use clickscape_imaging::DerivationEngine;
//! use clickscape_plan::{Plan, RuleResolver};
//!
//! let engine = DerivationEngine::default();
//! let rules = RuleResolver::default().rules_for(Plan::Free).clone();
//! let derived = engine.derive(&rules, bytes, &ext)?;
//! assert!(derived.watermarked);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod compress;
pub mod engine;
pub mod error;
mod glyphs;
pub mod watermark;

pub use compress::{compress_for_web, encode_web, fit_within, WebFormat, WEB_MAX_SIDE, WEB_QUALITY};
pub use engine::{Derivation, DerivationEngine, ImagingConfig};
pub use error::DerivationError;
pub use watermark::{Watermark, DEFAULT_WATERMARK_TEXT};

/// Sniff the container format of `bytes`, if it is one the decoder knows.
#[must_use]
pub fn sniff_format(bytes: &[u8]) -> Option<image::ImageFormat> {
    image::guess_format(bytes).ok()
}
