//! Error types for scanning and ingestion.
//!
//! Only scan input errors and setup failures ever reach the caller as `Err`.
//! Per-file problems during ingestion are recorded as outcomes instead, see
//! [`crate::ingest::IngestionOutcome`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by [`crate::scan::scan`].
#[derive(Error, Debug)]
pub enum ScanError {
    /// The root path was empty or could not be turned into an absolute path.
    #[error("invalid root directory {0:?}")]
    InvalidRoot(String),

    /// The root itself could not be traversed (missing, not readable, ...).
    #[error("failed to traverse {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by a [`crate::contract::StoreClient`] call.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached at all. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode store response: {0}")]
    Decode(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Connection-level failures, the only class the retry policy re-attempts.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            StoreError::Unavailable(e.to_string())
        } else if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            StoreError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            StoreError::Other(e.to_string())
        }
    }
}

/// One-time setup failures that abort the whole ingestion run.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("login failed for {email}: {source}")]
    Login {
        email: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create collection {name:?}: {source}")]
    CreateCollection {
        name: String,
        #[source]
        source: StoreError,
    },
}

/// Errors returned by [`crate::ingest::ingest`].
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("ingestion setup failed: {0}")]
    Setup(#[from] SetupError),
}
