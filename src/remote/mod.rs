//! Search backend abstraction.
//!
//! The [`SearchBackend`] trait is the only way the reconciliation pipeline
//! talks to the remote index. [`http::MeiliClient`] implements it over the
//! Meilisearch HTTP API; [`memory::InMemoryIndex`] keeps everything in
//! process for tests and local experiments.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::models::{Document, DocumentsPage, TaskInfo, TaskStatus};

pub use http::MeiliClient;
pub use memory::InMemoryIndex;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns up to `limit` records starting at `offset`, projected to
    /// `id` and `file_mtime`.
    ///
    /// Returns [`BackendError::IndexNotFound`] if the index does not exist.
    async fn fetch_documents(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<DocumentsPage, BackendError>;

    /// Inserts or replaces `documents`, keyed by id, in a single request.
    async fn add_documents(&self, documents: &[Document]) -> Result<TaskInfo, BackendError>;

    /// Deletes the documents with the given ids in a single request.
    async fn delete_documents(&self, ids: &[String]) -> Result<TaskInfo, BackendError>;

    /// Reports the processing state of an accepted write task.
    async fn task_status(&self, uid: u64) -> Result<TaskStatus, BackendError>;

    /// Returns the backend's self-reported health status (e.g. `"available"`).
    async fn health(&self) -> Result<String, BackendError>;
}
