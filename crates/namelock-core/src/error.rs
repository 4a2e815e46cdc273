//! Error types for Namelock

use crate::domain::locking::LockError;
use thiserror::Error;

/// Result type alias using Namelock's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Namelock error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Lock errors (E300-E399)
    #[error(transparent)]
    Lock(#[from] LockError),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown configuration key: {0}. Run `namelock config list` to see available keys.")]
    UnknownConfigKey(String),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lock(err) => err.code(),
            Self::ConfigError(_) => "E600",
            Self::UnknownConfigKey(_) => "E601",
            Self::ConfigParse { .. } => "E602",
            Self::ConfigSerialize(_) => "E603",
            Self::InvalidInput(_) => "E800",
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnknownConfigKey(_) => Some("namelock config list".to_string()),
            Self::ConfigParse { path, .. } => Some(format!("Fix or remove {}", path)),
            Self::Lock(LockError::InvalidConfig(_)) => Some("namelock config show".to_string()),
            _ => None,
        }
    }
}
