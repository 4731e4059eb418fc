use std::path::PathBuf;

use thiserror::Error;

/// Problems found while loading or validating `SimConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("required configuration missing: {what}")]
    Missing { what: &'static str },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Raised when a drive controller cannot be built from its configuration.
/// The owning run logs it and keeps the player car disabled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriveError {
    #[error("drive controller is missing {0}")]
    ConfigurationMissing(&'static str),

    #[error("drive stat `{stat}` must be positive and finite, got {value}")]
    InvalidStat { stat: &'static str, value: f32 },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
