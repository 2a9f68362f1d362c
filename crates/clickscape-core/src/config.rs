//! Pipeline configuration
//!
//! Defaults, then an optional TOML file, then environment overrides:
//!
//! | variable                     | field                     |
//! |------------------------------|---------------------------|
//! | `CLICKSCAPE_UPLOAD_DIR`      | `upload_dir`              |
//! | `DOWNLOAD_SECRET`            | `download_secret`         |
//! | `SECRET_KEY`                 | `download_secret` (fallback) |
//! | `CLICKSCAPE_LINK_TTL_SECS`   | `link_ttl_secs`           |
//! | `CLICKSCAPE_WATERMARK_LOGO`  | `imaging.watermark_logo`  |
//! | `CLICKSCAPE_WATERMARK_TEXT`  | `imaging.watermark_text`  |
//!
//! Plan limits read their own variables, see [`PlanConfig::apply_env_with`].

use crate::error::ConfigError;
use clickscape_imaging::ImagingConfig;
use clickscape_plan::PlanConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Secret used when none is configured; fine for tests, never for production
pub const INSECURE_DEFAULT_SECRET: &str = "change-me";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory blobs are written to
    pub upload_dir: PathBuf,
    /// Secret signed download links are keyed on
    pub download_secret: String,
    /// Lifetime of a signed link, seconds
    pub link_ttl_secs: u64,
    /// Upper bound on derivations running at once in a batch
    pub max_concurrent_derivations: usize,
    pub plans: PlanConfig,
    pub imaging: ImagingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            download_secret: INSECURE_DEFAULT_SECRET.to_string(),
            link_ttl_secs: 300,
            max_concurrent_derivations: 4,
            plans: PlanConfig::default(),
            imaging: ImagingConfig::default(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("upload_dir", &self.upload_dir)
            .field("download_secret", &"<redacted>")
            .field("link_ttl_secs", &self.link_ttl_secs)
            .field("max_concurrent_derivations", &self.max_concurrent_derivations)
            .field("plans", &self.plans)
            .field("imaging", &self.imaging)
            .finish()
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_download_secret(mut self, secret: impl Into<String>) -> Self {
        self.download_secret = secret.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_link_ttl_secs(mut self, ttl: u64) -> Self {
        self.link_ttl_secs = ttl;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_plans(mut self, plans: PlanConfig) -> Self {
        self.plans = plans;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_imaging(mut self, imaging: ImagingConfig) -> Self {
        self.imaging = imaging;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_concurrent_derivations(mut self, max: usize) -> Self {
        self.max_concurrent_derivations = max.max(1);
        self
    }

    #[must_use]
    pub fn uses_insecure_secret(&self) -> bool {
        self.download_secret == INSECURE_DEFAULT_SECRET
    }

    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns error on malformed TOML or inconsistent plan limits
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.plans.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Defaults with the process environment applied
    ///
    /// # Errors
    /// Returns error if a set variable is unusable
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// Returns error if a set variable is unusable
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    ///
    /// # Errors
    /// Returns error if a present value is unusable
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.plans = self.plans.apply_env_with(&lookup)?;

        if let Some(dir) = non_empty(&lookup, "CLICKSCAPE_UPLOAD_DIR") {
            info!(dir = %dir, "uploads directory overridden from environment");
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(secret) =
            non_empty(&lookup, "DOWNLOAD_SECRET").or_else(|| non_empty(&lookup, "SECRET_KEY"))
        {
            self.download_secret = secret;
        }
        if let Some(raw) = non_empty(&lookup, "CLICKSCAPE_LINK_TTL_SECS") {
            self.link_ttl_secs = match raw.trim().parse::<u64>() {
                Ok(ttl) if ttl > 0 => ttl,
                Ok(_) => {
                    return Err(ConfigError::InvalidEnv {
                        key: "CLICKSCAPE_LINK_TTL_SECS",
                        value: raw,
                        reason: "must be positive".into(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::InvalidEnv {
                        key: "CLICKSCAPE_LINK_TTL_SECS",
                        value: raw,
                        reason: e.to_string(),
                    })
                }
            };
        }
        if let Some(logo) = non_empty(&lookup, "CLICKSCAPE_WATERMARK_LOGO") {
            self.imaging.watermark_logo = Some(PathBuf::from(logo));
        }
        if let Some(text) = non_empty(&lookup, "CLICKSCAPE_WATERMARK_TEXT") {
            self.imaging.watermark_text = text;
        }
        Ok(self)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}
