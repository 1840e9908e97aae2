//! Typed error hierarchy for the pacer service.
//!
//! - `ConfigError` — loading, parsing and validating `pacer.toml`
//! - `ServerError` — binding and running the relay server
//!
//! Stream errors are not wrapped: the pacer forwards the upstream error type
//! unchanged.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the configuration layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse pacer.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize pacer.toml: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: impl ToString, message: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        }
    }
}

/// Errors from the relay server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
