//! Ingestion gate
//!
//! Checks an upload against the resolved [`UploadRules`] before anything is
//! decoded, stored or counted. Checks run cheapest first: extension, then
//! size, then a look at the leading bytes.

use crate::error::GateError;
use clickscape_artifact::FileExt;
use clickscape_imaging::sniff_format;
use clickscape_plan::{normalize_ext, Participation, UploadRules};
use image::ImageFormat;
use tracing::debug;

/// Check the number of files in one request
///
/// # Errors
/// [`GateError::EmptyBatch`] or [`GateError::BatchLimitExceeded`]
pub fn check_batch(rules: &UploadRules, count: usize) -> Result<(), GateError> {
    if count == 0 {
        return Err(GateError::EmptyBatch);
    }
    if count > rules.batch_limit {
        return Err(GateError::BatchLimitExceeded {
            plan: rules.plan,
            limit: rules.batch_limit,
            requested: count,
        });
    }
    Ok(())
}

/// Check one file; returns its normalised extension
///
/// # Errors
/// Returns the first rule the file breaks
pub fn check_file(rules: &UploadRules, filename: &str, bytes: &[u8]) -> Result<FileExt, GateError> {
    let ext = normalize_ext(filename);
    if !rules.allows(&ext) {
        return Err(GateError::UnsupportedFileType {
            plan: rules.plan,
            allowed: rules.allowed_list(),
        });
    }
    if bytes.is_empty() {
        return Err(GateError::EmptyFile);
    }
    if bytes.len() as u64 > rules.max_file_bytes {
        return Err(GateError::FileTooLarge {
            plan: rules.plan,
            max_mb: rules.max_file_mb(),
        });
    }
    check_signature(&ext, bytes)?;
    debug!(file = filename, ext = %ext, bytes = bytes.len(), "file passed gate");
    Ok(ext)
}

/// Raster container an extension promises, when it has a fixed signature
fn expected_format(ext: &FileExt) -> Option<ImageFormat> {
    match ext.as_str() {
        ".jpg" | ".jpeg" => Some(ImageFormat::Jpeg),
        ".png" => Some(ImageFormat::Png),
        ".tif" | ".tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

fn check_signature(ext: &FileExt, bytes: &[u8]) -> Result<(), GateError> {
    let Some(expected) = expected_format(ext) else {
        return Ok(());
    };
    match sniff_format(bytes) {
        Some(found) if found == expected => Ok(()),
        found => Err(GateError::ContentMismatch {
            ext: ext.clone(),
            detected: found.map_or_else(
                || "unknown data".to_string(),
                |f| format!("{f:?}").to_lowercase(),
            ),
        }),
    }
}

/// Check a sale price against the plan
///
/// # Errors
/// [`GateError::InvalidPrice`] or [`GateError::MarketplaceNotAllowed`]
pub fn check_listing(rules: &UploadRules, price: f64) -> Result<(), GateError> {
    if !price.is_finite() || price < 0.0 {
        return Err(GateError::InvalidPrice(price));
    }
    if price > 0.0 && !rules.marketplace {
        return Err(GateError::MarketplaceNotAllowed { plan: rules.plan });
    }
    Ok(())
}

/// Check that a competition entry fits the participation
///
/// # Errors
/// [`GateError::EntryNotPaid`] or [`GateError::NoEntrySlots`]
pub fn check_entry(
    participation: Option<&Participation>,
    slots_used: u32,
    slots: u32,
) -> Result<(), GateError> {
    match participation {
        Some(p) if p.entry_paid => {}
        _ => return Err(GateError::EntryNotPaid),
    }
    if slots_used >= slots {
        return Err(GateError::NoEntrySlots {
            used: slots_used,
            slots,
        });
    }
    Ok(())
}
