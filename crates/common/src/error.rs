//! Common error types for selfcheck components.

use std::fmt;

/// A specialized Result type for selfcheck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for selfcheck operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checks file error: {0}")]
    Checks(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new checks file error.
    pub fn checks(msg: impl fmt::Display) -> Self {
        Error::Checks(msg.to_string())
    }
}
