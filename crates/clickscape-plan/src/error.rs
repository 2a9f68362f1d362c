//! Error types for plan configuration

/// Plan configuration errors
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// An environment override could not be parsed
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// Config file could not be read
    #[error("failed to read plan config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::PlanConfig`]
    #[error("invalid plan config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Limits are inconsistent with each other
    #[error("inconsistent plan limits: {0}")]
    Inconsistent(String),
}
