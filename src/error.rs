//! Error types
//!
//! Library errors are typed so the retry and abort decisions stay visible in
//! the control flow. The binary wraps them in `anyhow` at the edge.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or missing configuration. Raised before any network call.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} is not set")]
    Missing { name: &'static str },

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to read config file {path}: {reason}")]
    File { path: PathBuf, reason: String },
}

/// Failure of a single call against the provider API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Timeouts, throttling and 5xx. Worth retrying.
    #[error("{operation}: transient failure: {reason}")]
    Transient { operation: String, reason: String },

    /// Authentication rejection, bad request, malformed response.
    #[error("{operation}: {reason}")]
    Fatal { operation: String, reason: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Retries ran out on a transient failure.
    #[error("{operation}: gave up after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

impl ApiError {
    pub fn transient(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transient {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fatal(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fatal {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Reasons a whole run stops without producing a snapshot.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create API client: {0}")]
    Client(#[source] ApiError),

    #[error("Failed to list servers: {0}")]
    Listing(#[source] ApiError),

    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("Failed to write snapshot to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
