//! Error types for the ClickScape pipeline
//!
//! - Gate rejections (format, size, batch, listing, competition entry)
//! - Quota and entry-slot exhaustion
//! - Ownership and lookup failures
//! - Derivation, storage and integrity failures

use crate::signing::LinkError;
use crate::store::StoreError;
use crate::types::PhotoId;
use clickscape_artifact::{ArtifactError, FileExt};
use clickscape_imaging::DerivationError;
use clickscape_plan::{Plan, PlanError};
use std::path::PathBuf;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Upload or listing refused by the ingestion gate
    #[error(transparent)]
    Rejected(#[from] GateError),

    /// Storage quota or entry slots exhausted
    #[error(transparent)]
    Quota(#[from] QuotaError),

    /// No photo with this id
    #[error("photo not found: {0}")]
    NotFound(PhotoId),

    /// Caller does not own the photo
    #[error("not allowed: {0}")]
    Forbidden(&'static str),

    /// Purchase of a photo that is not listed for sale
    #[error("photo {0} is not for sale")]
    NotForSale(PhotoId),

    /// Purchase of one's own photo
    #[error("cannot purchase your own photo")]
    OwnPhoto,

    /// Page or page size out of range
    #[error("invalid page {page} of size {size}: page starts at 1, size is 1..=100")]
    InvalidPage { page: usize, size: usize },

    /// Signed link rejected
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Derivation failed
    #[error("derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    /// Blob store failure
    #[error("storage failed: {0}")]
    Store(#[from] StoreError),

    /// Stored bytes do not match the recorded hash
    #[error("integrity check failed: {0}")]
    Integrity(#[from] ArtifactError),
}

impl PipelineError {
    /// Whether the caller caused the error (bad input, missing rights, unknown
    /// id) rather than the service
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Rejected(_)
            | Self::Quota(_)
            | Self::NotFound(_)
            | Self::Forbidden(_)
            | Self::NotForSale(_)
            | Self::OwnPhoto
            | Self::InvalidPage { .. }
            | Self::Link(_) => true,
            Self::Store(StoreError::NotFound(_)) => true,
            // An upload that claims to be an image but does not decode.
            Self::Derivation(DerivationError::Decode { .. }) => true,
            Self::Derivation(_) | Self::Store(_) | Self::Integrity(_) => false,
        }
    }

    /// Short label for metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Rejected(e) => e.reason(),
            Self::Quota(QuotaError::StorageExceeded { .. }) => "quota_exceeded",
            Self::Quota(QuotaError::NoEntrySlots { .. }) => "no_entry_slots",
            Self::Derivation(DerivationError::Decode { .. }) => "undecodable",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) | Self::OwnPhoto | Self::NotForSale(_) => "forbidden",
            Self::InvalidPage { .. } => "invalid_page",
            Self::Link(_) => "bad_link",
            Self::Derivation(_) | Self::Store(_) | Self::Integrity(_) => "internal",
        }
    }
}

/// Ingestion gate rejections
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateError {
    /// Batch with no files
    #[error("No files provided")]
    EmptyBatch,

    /// More files than the plan allows per request
    #[error("Too many files for {plan} plan. Max {limit} per upload, got {requested}")]
    BatchLimitExceeded {
        plan: Plan,
        limit: usize,
        requested: usize,
    },

    /// Extension not allowed for the plan
    #[error("Unsupported file type for {plan} plan. Allowed: {allowed}")]
    UnsupportedFileType { plan: Plan, allowed: String },

    /// Zero-byte upload
    #[error("Empty file")]
    EmptyFile,

    /// Upload exceeds the per-file size limit
    #[error("File too large for {plan} plan. Max {max_mb} MB")]
    FileTooLarge { plan: Plan, max_mb: u64 },

    /// Content does not match its extension
    #[error("File content does not match its {ext} extension (looks like {detected})")]
    ContentMismatch { ext: FileExt, detected: String },

    /// Negative or non-finite price
    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    /// Listing for sale needs marketplace access
    #[error("Marketplace listing is not available on the {plan} plan")]
    MarketplaceNotAllowed { plan: Plan },

    /// Competition entry without a paid participation
    #[error("Competition entry requires a paid participation")]
    EntryNotPaid,

    /// All entry slots used
    #[error("No competition entry slots left ({used} of {slots} used)")]
    NoEntrySlots { used: u32, slots: u32 },
}

impl GateError {
    /// Short label for metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty_batch",
            Self::BatchLimitExceeded { .. } => "batch_limit",
            Self::UnsupportedFileType { .. } => "unsupported_type",
            Self::EmptyFile => "empty_file",
            Self::FileTooLarge { .. } => "too_large",
            Self::ContentMismatch { .. } => "content_mismatch",
            Self::InvalidPrice(_) => "invalid_price",
            Self::MarketplaceNotAllowed { .. } => "marketplace_not_allowed",
            Self::EntryNotPaid => "entry_not_paid",
            Self::NoEntrySlots { .. } => "no_entry_slots",
        }
    }
}

/// Storage accountant errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    /// `used + requested` would exceed the quota
    #[error("Storage quota exceeded. Please delete files or upgrade your plan.")]
    StorageExceeded { used: u64, requested: u64, quota: u64 },

    /// Entry slots taken between the gate check and the reservation
    #[error("No competition entry slots left ({slots} in total)")]
    NoEntrySlots { slots: u32 },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Plan limits invalid
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Watermark logo unusable
    #[error("imaging configuration: {0}")]
    Imaging(#[from] DerivationError),

    /// Environment variable holds an unusable value
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// Config file unreadable
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file malformed
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Uploads directory cannot be created
    #[error("cannot prepare uploads directory: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_what_callers_display() {
        let err = GateError::UnsupportedFileType {
            plan: Plan::Free,
            allowed: ".jpeg, .jpg, .png".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported file type for free plan. Allowed: .jpeg, .jpg, .png"
        );

        let err = GateError::FileTooLarge {
            plan: Plan::Premium,
            max_mb: 25,
        };
        assert_eq!(err.to_string(), "File too large for premium plan. Max 25 MB");

        let err = PipelineError::from(QuotaError::StorageExceeded {
            used: 10,
            requested: 5,
            quota: 12,
        });
        assert_eq!(
            err.to_string(),
            "Storage quota exceeded. Please delete files or upgrade your plan."
        );
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(PipelineError::from(GateError::EmptyFile).is_client_error());
        assert!(PipelineError::NotFound(PhotoId::new()).is_client_error());
        assert!(!PipelineError::Store(StoreError::Io {
            key: "x.jpg".into(),
            source: std::io::Error::other("disk gone"),
        })
        .is_client_error());
    }

    #[test]
    fn reasons_are_stable_labels() {
        assert_eq!(PipelineError::from(GateError::EmptyBatch).reason(), "empty_batch");
        assert_eq!(
            PipelineError::from(QuotaError::NoEntrySlots { slots: 1 }).reason(),
            "no_entry_slots"
        );
    }
}
