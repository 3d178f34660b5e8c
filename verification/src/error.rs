//! Harness error types
//!
//! Only fatal conditions live here. Transient transport failures and
//! unexpected service behaviour are recorded as outcomes on the request
//! records, never raised.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid run configuration, detected before any request is sent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The liveness endpoint never answered 200 within its wait budget.
    #[error("Preflight failed: {url} not ready after {attempts} attempts ({waited:?} waited)")]
    PreflightFailed {
        url: String,
        attempts: u32,
        waited: Duration,
        last_error: Option<String>,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// A batch worker task panicked or was aborted.
    #[error("Batch worker failed: {0}")]
    WorkerFailed(String),
}

impl HarnessError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this error was raised before any request was issued.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
