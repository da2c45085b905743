//! In-memory [`SearchBackend`] implementation for testing.
//!
//! Records are kept as raw JSON values behind a `Mutex`, so tests can seed
//! records the pipeline would never write itself (a missing or non-numeric
//! `file_mtime`, for example). Like Meilisearch, the index springs into
//! existence on the first write; until then reads report
//! [`BackendError::IndexNotFound`]. Every request is counted so tests can
//! assert on chunking and on the absence of writes.
//!
//! Failure injection (rejected ids, failed tasks, failing or vanishing
//! reads) is only compiled into this crate's unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::SearchBackend;
use crate::error::BackendError;
use crate::models::{Document, DocumentsPage, RemoteRecord, TaskInfo, TaskStatus};

#[derive(Default)]
struct IndexState {
    exists: bool,
    records: BTreeMap<String, Value>,
    fetch_requests: usize,
    upsert_requests: Vec<usize>,
    delete_requests: Vec<usize>,
    rejected_ids: HashSet<String>,
    failed_tasks: HashSet<u64>,
    fail_reads: bool,
    hide_total: bool,
    vanish_after_first_page: bool,
    next_task_uid: u64,
}

impl IndexState {
    fn next_task(&mut self) -> TaskInfo {
        let uid = self.next_task_uid;
        self.next_task_uid += 1;
        TaskInfo {
            task_uid: Some(uid),
        }
    }
}

/// In-memory stand-in for a remote index.
#[derive(Default)]
pub struct InMemoryIndex {
    state: Mutex<IndexState>,
}

impl InMemoryIndex {
    /// An index that does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// An existing index holding `documents`.
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let index = Self::new();
        {
            let mut state = index.lock();
            state.exists = true;
            for doc in documents {
                if let Ok(value) = serde_json::to_value(&doc) {
                    state.records.insert(doc.id, value);
                }
            }
        }
        index
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a raw record as-is. The record must carry a string `id`.
    pub fn insert_raw(&self, record: Value) {
        let mut state = self.lock();
        state.exists = true;
        if let Some(id) = record.get("id").and_then(Value::as_str).map(str::to_string) {
            state.records.insert(id, record);
        }
    }

    /// Rejects any upsert request that contains a document with this id.
    #[cfg(test)]
    pub(crate) fn reject_id(&self, id: &str) {
        self.lock().rejected_ids.insert(id.to_string());
    }

    /// Accepts the write with this task uid but reports it as failed.
    #[cfg(test)]
    pub(crate) fn fail_task(&self, uid: u64) {
        self.lock().failed_tasks.insert(uid);
    }

    /// Makes every read fail with a 500.
    #[cfg(test)]
    pub(crate) fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Omits `total` from pages, forcing short-page termination.
    #[cfg(test)]
    pub(crate) fn hide_total(&self, hide: bool) {
        self.lock().hide_total = hide;
    }

    /// Reports the index as missing for any read past offset 0.
    #[cfg(test)]
    pub(crate) fn vanish_after_first_page(&self, vanish: bool) {
        self.lock().vanish_after_first_page = vanish;
    }

    pub fn exists(&self) -> bool {
        self.lock().exists
    }

    /// Documents currently stored, in id order. Raw records that do not
    /// parse as a [`Document`] are left out.
    pub fn documents(&self) -> Vec<Document> {
        self.lock()
            .records
            .values()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.lock()
            .records
            .get(id)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetch_requests(&self) -> usize {
        self.lock().fetch_requests
    }

    /// Size of each upsert request received, in order.
    pub fn upsert_requests(&self) -> Vec<usize> {
        self.lock().upsert_requests.clone()
    }

    /// Size of each delete request received, in order.
    pub fn delete_requests(&self) -> Vec<usize> {
        self.lock().delete_requests.clone()
    }

    /// Forgets request counters, keeping stored records.
    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.fetch_requests = 0;
        state.upsert_requests.clear();
        state.delete_requests.clear();
    }
}

#[async_trait]
impl SearchBackend for InMemoryIndex {
    async fn fetch_documents(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<DocumentsPage, BackendError> {
        let mut state = self.lock();
        state.fetch_requests += 1;
        if state.fail_reads {
            return Err(BackendError::Status {
                status: 500,
                message: "simulated read failure".to_string(),
            });
        }
        if !state.exists || (state.vanish_after_first_page && offset > 0) {
            return Err(BackendError::IndexNotFound);
        }

        let results: Vec<RemoteRecord> = state
            .records
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(id, record)| RemoteRecord {
                id: id.clone(),
                file_mtime: record.get("file_mtime").and_then(Value::as_f64),
            })
            .collect();
        let total = (!state.hide_total).then_some(state.records.len() as u64);

        Ok(DocumentsPage {
            fetched: results.len(),
            results,
            total,
        })
    }

    async fn add_documents(&self, documents: &[Document]) -> Result<TaskInfo, BackendError> {
        let mut state = self.lock();
        state.upsert_requests.push(documents.len());
        if let Some(doc) = documents.iter().find(|d| state.rejected_ids.contains(&d.id)) {
            return Err(BackendError::Status {
                status: 400,
                message: format!("document {} rejected", doc.id),
            });
        }

        let task = state.next_task();
        let failed = task
            .task_uid
            .is_some_and(|uid| state.failed_tasks.contains(&uid));
        if !failed {
            state.exists = true;
            for doc in documents {
                let value = serde_json::to_value(doc)
                    .map_err(|e| BackendError::Decode(e.to_string()))?;
                state.records.insert(doc.id.clone(), value);
            }
        }
        Ok(task)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<TaskInfo, BackendError> {
        let mut state = self.lock();
        state.delete_requests.push(ids.len());
        let task = state.next_task();
        let failed = task
            .task_uid
            .is_some_and(|uid| state.failed_tasks.contains(&uid));
        if !failed {
            for id in ids {
                state.records.remove(id);
            }
        }
        Ok(task)
    }

    async fn task_status(&self, uid: u64) -> Result<TaskStatus, BackendError> {
        let state = self.lock();
        if uid >= state.next_task_uid {
            return Err(BackendError::Status {
                status: 404,
                message: format!("task {} not found", uid),
            });
        }
        if state.failed_tasks.contains(&uid) {
            Ok(TaskStatus::Failed("simulated task failure".to_string()))
        } else {
            Ok(TaskStatus::Succeeded)
        }
    }

    async fn health(&self) -> Result<String, BackendError> {
        Ok("available".to_string())
    }
}
