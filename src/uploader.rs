//! Chunked, paced writes to the search backend.
//!
//! Upserts and deletes are split into fixed-size chunks, one request per
//! chunk, with a short pause between requests. A failed chunk is logged and
//! the remaining chunks are still sent; there is no retry within a run,
//! because anything that did not land leaves a stale `file_mtime` behind
//! and the next run's diff picks it up again.

use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::config::SearchConfig;
use crate::error::BackendError;
use crate::models::{Document, TaskInfo, TaskStatus};
use crate::remote::SearchBackend;

const TASK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Result of submitting one batch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Requests issued, one per chunk.
    pub requests: usize,
    /// Ids in chunks the backend accepted.
    pub accepted: Vec<String>,
    /// Ids in chunks the backend rejected.
    pub failed: Vec<String>,
}

enum Chunk<'a> {
    Upsert(&'a [Document]),
    Delete(&'a [String]),
}

impl Chunk<'_> {
    fn operation(&self) -> &'static str {
        match self {
            Chunk::Upsert(_) => "upsert",
            Chunk::Delete(_) => "delete",
        }
    }

    fn ids(&self) -> Vec<String> {
        match self {
            Chunk::Upsert(docs) => docs.iter().map(|d| d.id.clone()).collect(),
            Chunk::Delete(ids) => ids.to_vec(),
        }
    }

    async fn send(&self, backend: &dyn SearchBackend) -> Result<TaskInfo, BackendError> {
        match self {
            Chunk::Upsert(docs) => backend.add_documents(docs).await,
            Chunk::Delete(ids) => backend.delete_documents(ids).await,
        }
    }
}

pub struct BatchUploader {
    chunk_size: usize,
    pause: Duration,
    task_wait: Option<Duration>,
    poll_interval: Duration,
}

impl BatchUploader {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            chunk_size: config.batch_size.max(1),
            pause: config.batch_pause(),
            task_wait: config.task_wait(),
            poll_interval: TASK_POLL_INTERVAL,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_task_wait(mut self, wait: Option<Duration>, poll_interval: Duration) -> Self {
        self.task_wait = wait;
        self.poll_interval = poll_interval;
        self
    }

    /// Upserts `documents`. The documents are consumed.
    pub async fn upsert(&self, backend: &dyn SearchBackend, documents: Vec<Document>) -> BatchOutcome {
        let chunks = documents.chunks(self.chunk_size).map(Chunk::Upsert).collect();
        self.submit(backend, chunks).await
    }

    pub async fn delete(&self, backend: &dyn SearchBackend, ids: Vec<String>) -> BatchOutcome {
        let chunks = ids.chunks(self.chunk_size).map(Chunk::Delete).collect();
        self.submit(backend, chunks).await
    }

    async fn submit(&self, backend: &dyn SearchBackend, chunks: Vec<Chunk<'_>>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                sleep(self.pause).await;
            }
            outcome.requests += 1;
            let ids = chunk.ids();
            let op = chunk.operation();

            let result = match chunk.send(backend).await {
                Ok(task) => self.settle(backend, &task).await.map(|()| task),
                Err(e) => Err(e),
            };

            match result {
                Ok(task) => {
                    tracing::debug!(
                        op,
                        chunk = i + 1,
                        of = total,
                        size = ids.len(),
                        task_uid = ?task.task_uid,
                        "chunk accepted"
                    );
                    outcome.accepted.extend(ids);
                }
                Err(e) => {
                    let task_uid = match &e {
                        BackendError::TaskFailed { uid, .. } => Some(*uid),
                        _ => None,
                    };
                    tracing::warn!(
                        op,
                        chunk = i + 1,
                        of = total,
                        size = ids.len(),
                        task_uid = ?task_uid,
                        error = %e,
                        "chunk failed, continuing with the next one"
                    );
                    outcome.failed.extend(ids);
                }
            }
        }

        outcome
    }

    /// Waits for an accepted task to settle, when task waiting is enabled.
    ///
    /// A task still pending at the deadline counts as accepted.
    async fn settle(&self, backend: &dyn SearchBackend, task: &TaskInfo) -> Result<(), BackendError> {
        let (Some(wait), Some(uid)) = (self.task_wait, task.task_uid) else {
            return Ok(());
        };
        let deadline = Instant::now() + wait;

        loop {
            match backend.task_status(uid).await? {
                TaskStatus::Succeeded => return Ok(()),
                TaskStatus::Failed(message) => {
                    return Err(BackendError::TaskFailed {
                        uid,
                        status: "failed".to_string(),
                        message,
                    })
                }
                TaskStatus::Canceled => {
                    return Err(BackendError::TaskFailed {
                        uid,
                        status: "canceled".to_string(),
                        message: "task was canceled".to_string(),
                    })
                }
                TaskStatus::Enqueued | TaskStatus::Processing => {}
            }
            if Instant::now() >= deadline {
                tracing::warn!(task_uid = uid, "task still pending after wait timeout");
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
    }
}
