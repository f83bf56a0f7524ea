//! Error taxonomy for one ingestion run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or invalid configuration / credentials. Nothing is written.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The forum client could not be built or refused our credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Any failure from the forum client mid-walk. The run's ledger progress is dropped.
    #[error("remote fetch failed: {0}")]
    RemoteFetch(#[from] SourceError),

    /// Appending rows to the output table failed. Recovered by the orchestrator.
    #[error("sink write failed for {path}: {message}")]
    SinkWrite { path: String, message: String },

    /// The ledger could not be written back at the end of the run.
    #[error("ledger persist failed: {0}")]
    LedgerPersist(String),
}

/// Errors raised by a [`crate::PostSource`] implementation.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}
