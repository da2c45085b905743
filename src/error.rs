//! Error types for docsync.
//!
//! Errors are split by blast radius: [`ExtractError`] is scoped to a single
//! file and never ends a run, [`BackendError`] describes one request against
//! the search backend, and [`SyncError`] is reserved for the conditions that
//! abort a whole reconciliation run.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn one file into indexable text.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// No candidate text encoding decoded the file.
    #[error("no candidate encoding could decode the file (tried {})", .tried.join(", "))]
    Encoding { tried: Vec<&'static str> },

    /// The PDF or EPUB is structurally invalid.
    #[error("malformed document: {0}")]
    Format(String),

    /// Read or parse failure not classified above.
    #[error("io error: {0}")]
    Io(String),

    /// The file decoded but held nothing but whitespace.
    #[error("extracted content is empty")]
    Empty,
}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        ExtractError::Io(e.to_string())
    }
}

/// Failure of a single request against the search backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The index does not exist yet (HTTP 404).
    #[error("index not found")]
    IndexNotFound,

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// An accepted write task later failed inside the backend.
    #[error("task {uid} {status}: {message}")]
    TaskFailed {
        uid: u64,
        status: String,
        message: String,
    },
}

/// Conditions that abort a reconciliation run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The document root is missing or unreadable.
    #[error("cannot scan {}: {reason}", .root.display())]
    Scan { root: PathBuf, reason: String },

    /// The remote baseline could not be retrieved.
    #[error("failed to read remote index state: {0}")]
    RemoteState(#[source] BackendError),
}
