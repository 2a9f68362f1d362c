//! ClickScape Artifacts
//!
//! Content-addressed image artifacts produced by the upload pipeline.
//!
//! # Core Concepts
//!
//! - [`Artifact<T>`]: an [`ImageBlob`] tagged as [`OriginalImage`] or
//!   [`ProcessedImage`], with its [`ContentHash`]
//! - [`ArtifactVariant`]: which of the two a viewer is served
//! - [`FileExt`]: normalised extension used by upload rules and blob names
//!
//! # Example
//!
//! ```rust
//! use clickscape_artifact::{Artifact, FileExt, ImageBlob, ProcessedImage};
//!
//! let blob = ImageBlob::new(vec![0xFF, 0xD8, 0xFF], FileExt::parse("jpg"));
//! let artifact = Artifact::<ProcessedImage>::new(blob).unwrap();
//! assert!(artifact.verify());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod ext;
mod hash;

pub use artifact::{
    Artifact, ArtifactError, ArtifactType, ArtifactVariant, ImageBlob, OriginalImage,
    ProcessedImage,
};
pub use ext::FileExt;
pub use hash::{ContentHash, HashError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
