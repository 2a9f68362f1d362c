//! ClickScape Plans
//!
//! Subscription plans, competition participation and the upload rules they
//! resolve to.
//!
//! ```rust
//! use clickscape_plan::{normalize_ext, Plan, RuleResolver};
//!
//! let resolver = RuleResolver::default();
//! let rules = resolver.rules_for(Plan::parse("free"));
//! assert!(rules.allows(&normalize_ext("beach.JPG")));
//! assert!(!rules.allows(&normalize_ext("scan.tiff")));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod plan;
pub mod rules;

use clickscape_artifact::FileExt;

pub use config::PlanConfig;
pub use error::PlanError;
pub use plan::{CompetitionTier, Participation, Plan};
pub use rules::{RuleResolver, UploadRules};

/// Lowercase extension of `filename`, with its dot
#[inline]
#[must_use]
pub fn normalize_ext(filename: &str) -> FileExt {
    FileExt::from_filename(filename)
}
