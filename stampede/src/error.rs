//! Error types.
//!
//! Only run setup and reporting can fail. Errors raised by remote calls stay inside the
//! flow that made them and end up as failure outcomes.

use thiserror::Error;

/// Run-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A configuration value that could not be resolved.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name}={value:?} is not a valid {expected}")]
    InvalidValue {
        name: String,
        value: String,
        expected: &'static str,
    },
    #[error("{name}={value:?} is not a valid duration (expected e.g. 500ms, 30s, 2m, 1h)")]
    InvalidDuration { name: String, value: String },
    #[error("base URL {0:?} is not an absolute http(s) URL")]
    InvalidBaseUrl(String),
}

/// Error raised by the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ApiError::Transport(e) => e.is_timeout(),
        }
    }
}
