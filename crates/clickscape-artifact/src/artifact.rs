//! Typed, content-addressed artifacts
//!
//! An upload produces up to two artifacts: the processed copy every viewer
//! may see, and the untouched original kept for entitled viewers. Both are
//! [`Artifact`]s over an [`ImageBlob`]; the marker type keeps them from
//! being mixed up when they are stored or served.

use crate::ext::FileExt;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for artifact kinds
///
/// This trait is **sealed**: the only kinds are [`OriginalImage`] and
/// [`ProcessedImage`].
pub trait ArtifactType: Send + Sync + 'static + Debug + private::Sealed {
    /// Which side of the upload this kind represents
    const VARIANT: ArtifactVariant;

    /// Validate content invariants
    ///
    /// # Errors
    /// Returns error if content violates invariants
    fn validate_content(content: &ImageBlob) -> Result<(), ArtifactError> {
        if content.is_empty() {
            return Err(ArtifactError::InvariantViolation(format!(
                "{} artifact has no bytes",
                Self::VARIANT
            )));
        }
        Ok(())
    }
}

#[doc(hidden)]
pub mod private {
    /// Sealed trait marker
    pub trait Sealed {}
}

/// Which derived artifact of an upload is meant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactVariant {
    /// The raw upload, byte for byte
    Original,
    /// Web copy: compressed, and watermarked where the plan requires it
    Processed,
}

impl ArtifactVariant {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Processed => "processed",
        }
    }
}

impl Display for ArtifactVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker for the retained raw upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalImage;

/// Marker for the web-quality derived copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedImage;

impl private::Sealed for OriginalImage {}
impl private::Sealed for ProcessedImage {}

impl ArtifactType for OriginalImage {
    const VARIANT: ArtifactVariant = ArtifactVariant::Original;
}

impl ArtifactType for ProcessedImage {
    const VARIANT: ArtifactVariant = ArtifactVariant::Processed;
}

/// Encoded image bytes plus the extension they are stored under
///
/// Bytes are shared, so cloning a blob (or an artifact) never copies the
/// image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    bytes: Arc<[u8]>,
    ext: FileExt,
}

impl ImageBlob {
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>, ext: FileExt) -> Self {
        Self {
            bytes: bytes.into(),
            ext,
        }
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes
    #[inline]
    #[must_use]
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    #[inline]
    #[must_use]
    pub fn ext(&self) -> &FileExt {
        &self.ext
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Errors related to artifact operations
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Content invariant violation
    #[error("content invariant violated: {0}")]
    InvariantViolation(String),

    /// Stored bytes no longer match the recorded hash
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
}

/// Content-addressed image artifact
///
/// # Invariants
/// - `hash` is always the Blake3 hash of the blob bytes
/// - Immutable after construction
#[derive(PartialEq, Eq)]
pub struct Artifact<T: ArtifactType> {
    hash: ContentHash,
    content: ImageBlob,
    _phantom: PhantomData<T>,
}

impl<T: ArtifactType> Debug for Artifact<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("variant", &T::VARIANT)
            .field("hash", &self.hash.short())
            .field("ext", &self.content.ext)
            .field("len", &self.content.len())
            .finish()
    }
}

impl<T: ArtifactType> Clone for Artifact<T> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            content: self.content.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: ArtifactType> Artifact<T> {
    /// Create new artifact (validates, then hashes)
    ///
    /// # Errors
    /// Returns error if content validation fails
    pub fn new(content: ImageBlob) -> Result<Self, ArtifactError> {
        T::validate_content(&content)?;
        Ok(Self {
            hash: ContentHash::compute(content.bytes()),
            content,
            _phantom: PhantomData,
        })
    }

    /// Rebuild an artifact read back from storage, checking it against the
    /// hash recorded when it was written.
    ///
    /// # Errors
    /// Returns [`ArtifactError::HashMismatch`] when the bytes changed, or a
    /// validation error.
    pub fn restore(content: ImageBlob, expected: ContentHash) -> Result<Self, ArtifactError> {
        let artifact = Self::new(content)?;
        if artifact.hash != expected {
            return Err(ArtifactError::HashMismatch {
                expected,
                actual: artifact.hash,
            });
        }
        Ok(artifact)
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    #[inline]
    #[must_use]
    pub fn content(&self) -> &ImageBlob {
        &self.content
    }

    #[inline]
    #[must_use]
    pub fn into_content(self) -> ImageBlob {
        self.content
    }

    /// Recompute the hash and compare
    #[inline]
    #[must_use]
    pub fn verify(&self) -> bool {
        self.hash.matches(self.content.bytes())
    }

    #[inline]
    #[must_use]
    pub fn variant() -> ArtifactVariant {
        T::VARIANT
    }
}
