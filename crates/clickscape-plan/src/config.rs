//! Plan limits configuration
//!
//! Defaults match the production tiers. Limits can come from a TOML file
//! and/or be overridden per key from the environment.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

const MIB: u64 = 1024 * 1024;

/// Tunable plan limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Per-file limit for free uploads, MiB
    pub free_max_upload_mb: u64,
    /// Per-file limit for premium uploads, MiB
    pub premium_max_upload_mb: u64,
    /// Premium storage quota, MiB
    pub premium_storage_quota_mb: u64,
    /// Files per upload request on the free plan
    pub free_batch_limit: usize,
    /// Files per upload request on the premium plan
    pub premium_batch_limit: usize,
    /// Extensions any plan may upload
    pub free_extensions: Vec<String>,
    /// Extensions only premium may upload, on top of `free_extensions`
    pub premium_extra_extensions: Vec<String>,
    /// Competition entries included with a paid enthusiast entry
    pub enthusiast_base_entries: u32,
    /// Competition entries included with a paid creator+ entry
    pub creator_plus_base_entries: u32,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            free_max_upload_mb: 3,
            premium_max_upload_mb: 25,
            premium_storage_quota_mb: 10 * 1024,
            free_batch_limit: 1,
            premium_batch_limit: 10,
            free_extensions: vec![".jpg".into(), ".jpeg".into(), ".png".into()],
            premium_extra_extensions: vec![
                ".tif".into(),
                ".tiff".into(),
                ".raw".into(),
                ".psd".into(),
            ],
            enthusiast_base_entries: 1,
            creator_plus_base_entries: 5,
        }
    }
}

impl PlanConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With per-file upload limits in MiB
    #[must_use]
    pub fn with_max_upload_mb(mut self, free: u64, premium: u64) -> Self {
        self.free_max_upload_mb = free;
        self.premium_max_upload_mb = premium;
        self
    }

    /// With premium storage quota in MiB
    #[must_use]
    pub fn with_premium_quota_mb(mut self, quota: u64) -> Self {
        self.premium_storage_quota_mb = quota;
        self
    }

    /// With files-per-request limits
    #[must_use]
    pub fn with_batch_limits(mut self, free: usize, premium: usize) -> Self {
        self.free_batch_limit = free;
        self.premium_batch_limit = premium;
        self
    }

    #[must_use]
    pub fn free_max_bytes(&self) -> u64 {
        self.free_max_upload_mb.saturating_mul(MIB)
    }

    #[must_use]
    pub fn premium_max_bytes(&self) -> u64 {
        self.premium_max_upload_mb.saturating_mul(MIB)
    }

    #[must_use]
    pub fn premium_quota_bytes(&self) -> u64 {
        self.premium_storage_quota_mb.saturating_mul(MIB)
    }

    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns error on malformed TOML or inconsistent limits
    pub fn from_toml_str(source: &str) -> Result<Self, PlanError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let source = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// Returns error if a set variable does not parse
    pub fn apply_env(self) -> Result<Self, PlanError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    ///
    /// # Errors
    /// Returns error if a present value does not parse or the result is
    /// inconsistent
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, PlanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "FREE_MAX_UPLOAD_MB", &mut self.free_max_upload_mb)?;
        override_from(&lookup, "PREMIUM_MAX_UPLOAD_MB", &mut self.premium_max_upload_mb)?;
        override_from(
            &lookup,
            "PREMIUM_STORAGE_QUOTA_MB",
            &mut self.premium_storage_quota_mb,
        )?;
        override_from(&lookup, "FREE_BATCH_LIMIT", &mut self.free_batch_limit)?;
        override_from(&lookup, "PREMIUM_BATCH_LIMIT", &mut self.premium_batch_limit)?;
        self.validate()?;
        Ok(self)
    }

    /// Check that premium is never stricter than free
    ///
    /// # Errors
    /// Returns [`PlanError::Inconsistent`] describing the first violation
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.free_max_upload_mb == 0 {
            return Err(PlanError::Inconsistent(
                "free_max_upload_mb must be positive".into(),
            ));
        }
        if self.premium_max_upload_mb < self.free_max_upload_mb {
            return Err(PlanError::Inconsistent(format!(
                "premium_max_upload_mb ({}) below free_max_upload_mb ({})",
                self.premium_max_upload_mb, self.free_max_upload_mb
            )));
        }
        if self.free_batch_limit == 0 {
            return Err(PlanError::Inconsistent(
                "free_batch_limit must be at least 1".into(),
            ));
        }
        if self.premium_batch_limit < self.free_batch_limit {
            return Err(PlanError::Inconsistent(format!(
                "premium_batch_limit ({}) below free_batch_limit ({})",
                self.premium_batch_limit, self.free_batch_limit
            )));
        }
        if self.free_extensions.is_empty() {
            return Err(PlanError::Inconsistent(
                "free_extensions must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn override_from<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), PlanError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    let parsed = raw.trim().parse::<T>().map_err(|e| PlanError::InvalidEnv {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    info!("{key} overridden from environment: {parsed}");
    *slot = parsed;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_production_tiers() {
        let config = PlanConfig::default();
        assert_eq!(config.free_max_bytes(), 3 * MIB);
        assert_eq!(config.premium_max_bytes(), 25 * MIB);
        assert_eq!(config.premium_quota_bytes(), 10_240 * MIB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let config = PlanConfig::default()
            .apply_env_with(env(&[
                ("PREMIUM_STORAGE_QUOTA_MB", "1"),
                ("FREE_MAX_UPLOAD_MB", " 2 "),
            ]))
            .unwrap();
        assert_eq!(config.premium_storage_quota_mb, 1);
        assert_eq!(config.free_max_upload_mb, 2);
        assert_eq!(config.premium_max_upload_mb, 25);
    }

    #[test]
    fn env_garbage_is_an_error() {
        let result = PlanConfig::default().apply_env_with(env(&[("PREMIUM_MAX_UPLOAD_MB", "lots")]));
        assert!(matches!(
            result,
            Err(PlanError::InvalidEnv {
                key: "PREMIUM_MAX_UPLOAD_MB",
                ..
            })
        ));
    }

    #[test]
    fn premium_stricter_than_free_rejected() {
        let result = PlanConfig::default()
            .with_max_upload_mb(10, 5)
            .validate();
        assert!(matches!(result, Err(PlanError::Inconsistent(_))));

        let result = PlanConfig::default().with_batch_limits(4, 2).validate();
        assert!(matches!(result, Err(PlanError::Inconsistent(_))));
    }

    #[test]
    fn toml_partial_document_keeps_defaults() {
        let config = PlanConfig::from_toml_str(
            r#"
            premium_storage_quota_mb = 512
            premium_extra_extensions = [".tiff"]
            "#,
        )
        .unwrap();
        assert_eq!(config.premium_storage_quota_mb, 512);
        assert_eq!(config.premium_extra_extensions, vec![".tiff".to_string()]);
        assert_eq!(config.free_batch_limit, 1);
    }

    #[test]
    fn toml_type_error_reported() {
        let result = PlanConfig::from_toml_str("free_batch_limit = \"one\"");
        assert!(matches!(result, Err(PlanError::Toml(_))));
    }
}
