//! Core data models used throughout docsync.
//!
//! These types represent the documents, state maps, and run results that flow
//! through the reconciliation pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Map of document id to last-known modification time (seconds since epoch).
pub type StateMap = BTreeMap<String, f64>;

/// State rebuilt from the document root on every run.
pub type LocalState = StateMap;

/// State as last recorded in the remote index.
pub type RemoteState = StateMap;

/// Remote mtime recorded for an index record without a numeric
/// `file_mtime`. Below every real mtime, including 0, so the diff always
/// treats such a record as stale.
pub const MISSING_MTIME: f64 = f64::NEG_INFINITY;

/// A document as stored in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// File base name, the primary key on both sides.
    pub id: String,
    /// Extracted, trimmed text. Never empty.
    pub content: String,
    pub file_mtime: f64,
    /// When the text was extracted. Not used for diffing.
    pub indexed_at: f64,
}

/// A supported file found under the document root.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub id: String,
    pub path: PathBuf,
    pub mtime: f64,
}

/// Minimal projection of an index record used to build [`RemoteState`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: String,
    /// `None` when the record has no numeric `file_mtime`.
    pub file_mtime: Option<f64>,
}

/// One page of index records.
#[derive(Debug, Clone, Default)]
pub struct DocumentsPage {
    pub results: Vec<RemoteRecord>,
    /// Records the backend returned, including any dropped from `results`
    /// for lacking a usable id. Paging advances by this count.
    pub fetched: usize,
    /// Total record count, when the backend reports it.
    pub total: Option<u64>,
}

/// Receipt for an accepted write request.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub task_uid: Option<u64>,
}

/// Processing state of a backend task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed(String),
    Canceled,
}

/// Counts reported at the end of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    /// Unchanged files plus files no extractor applies to.
    pub skipped: usize,
    /// Files whose extraction failed or produced no text.
    pub errored: usize,
    pub deleted: usize,
    /// Documents in upsert chunks the backend rejected.
    pub upload_failed: usize,
    /// Ids in delete chunks the backend rejected.
    pub delete_failed: usize,
    pub dry_run: bool,
}

impl SyncReport {
    /// Number of write operations the run performed.
    pub fn writes(&self) -> usize {
        self.added + self.updated + self.deleted
    }

    /// True if any file or chunk failed during the run.
    pub fn has_failures(&self) -> bool {
        self.errored + self.upload_failed + self.delete_failed > 0
    }
}
