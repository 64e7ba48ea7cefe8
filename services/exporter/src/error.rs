use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Errors surfaced by the exporter components
///
/// Only [`ExporterError::Bind`] is fatal. Everything else is caught at the
/// per-target or per-cycle boundary and reported through logs.
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to access bucket {bucket}: {message}")]
    TargetAccess { bucket: String, message: String },

    #[error("Collection for bucket {bucket} timed out after {after:?}")]
    Timeout { bucket: String, after: Duration },

    #[error("Failed to bind metrics listener on {addr}: {message}")]
    Bind { addr: String, message: String },
}

impl ExporterError {
    pub fn target_access(bucket: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetAccess {
            bucket: bucket.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = ExporterError> = std::result::Result<T, E>;
