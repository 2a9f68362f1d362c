//! ClickScape Core - plan-gated photo pipeline
//!
//! Decides, per upload, which transformations apply based on the
//! uploader's plan, and later which derived artifact a viewer may receive:
//! - Ingestion gate: format, size, batch, listing and entry checks
//! - Storage accountant: atomic quota and entry-slot reservations
//! - Entitlement resolver: original vs processed at read time
//! - Blob store, catalog and purchase ledger
//! - Signed, expiring download links
//!
//! # Example
//!
//! ```rust,ignore
//! use clickscape_core::prelude::*;
//!
//! # async fn example(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = PhotoPipeline::open(PipelineConfig::from_env()?).await?;
//! let account = Account::new(UserId(1), Plan::Premium);
//!
//! let upload = UploadRequest::new(UploadFile::new("fort.jpg", bytes), PhotoMetadata::new("Fort"));
//! let photo = pipeline.upload(&account, upload).await?;
//!
//! let export = pipeline.export(&Viewer::from(&account), photo.id)?;
//! assert_eq!(export.quality, Quality::High);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod accountant;
pub mod catalog;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod purchases;
pub mod signing;
pub mod store;
pub mod types;

pub use accountant::{Reservation, StorageAccountant};
pub use catalog::{Page, PhotoCatalog, MAX_PAGE_SIZE};
pub use config::PipelineConfig;
pub use entitlement::{resolve, Entitlement};
pub use error::{ConfigError, GateError, PipelineError, QuotaError};
pub use pipeline::PhotoPipeline;
pub use purchases::PurchaseLedger;
pub use signing::{LinkError, LinkSigner, SignedLink};
pub use store::{BlobStore, FsBlobStore, MemoryBlobStore, StoreError, UPLOADS_PREFIX};
pub use types::{
    Account, BatchUpload, Download, Export, PhotoId, PhotoMetadata, PhotoRecord, PhotoUpdate,
    Quality, StoredArtifact, UploadFile, UploadRequest, Usage, UserId, Viewer,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the pipeline
    pub use crate::{
        Account, BatchUpload, Export, PhotoId, PhotoMetadata, PhotoPipeline, PhotoRecord,
        PhotoUpdate, PipelineConfig, PipelineError, Quality, UploadFile, UploadRequest, UserId,
        Viewer,
    };
    pub use clickscape_plan::{CompetitionTier, Participation, Plan};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
