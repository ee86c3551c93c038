//! Error types for the self-check engine.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by failure hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Malformed checks source. Fatal at load time.
#[derive(Debug, Error)]
pub enum ChecksError {
    #[error("Failed to read checks file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: invalid check url {url:?}: {reason}")]
    InvalidUrl {
        line: usize,
        url: String,
        reason: String,
    },

    #[error("line {line}: check url {url:?} must have an absolute path")]
    RelativePath { line: usize, url: String },

    #[error("line {line}: check url {url:?} uses unsupported scheme {scheme:?}")]
    UnsupportedScheme {
        line: usize,
        url: String,
        scheme: String,
    },
}

/// Failure of a single probe. Always contained in that check's outcome.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("too many redirects ({0})")]
    TooManyRedirects(usize),

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout(_))
    }
}

/// Engine construction failure. Fatal at setup time.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("a checks source (file or inline text) is required")]
    MissingSource,

    #[error("probe timeout must be greater than zero")]
    InvalidTimeout,

    #[error(transparent)]
    Checks(#[from] ChecksError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<ChecksError> for common::Error {
    fn from(err: ChecksError) -> Self {
        common::Error::checks(err)
    }
}

impl From<SetupError> for common::Error {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::Checks(e) => e.into(),
            other => common::Error::config(other),
        }
    }
}
