//! Error types for derivation

use clickscape_artifact::{ArtifactError, FileExt};

/// Derivation errors
#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
    /// Upload could not be decoded as an image
    #[error("cannot decode {ext} upload: {source}")]
    Decode {
        ext: FileExt,
        #[source]
        source: image::ImageError,
    },

    /// Processed copy could not be encoded
    #[error("cannot encode processed image: {0}")]
    Encode(#[source] image::ImageError),

    /// Configured watermark logo could not be loaded
    #[error("cannot load watermark logo {path}: {source}")]
    Logo {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// Derived bytes violate artifact invariants
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Blocking task panicked or was cancelled
    #[error("derivation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
