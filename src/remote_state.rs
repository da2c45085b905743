//! Reads the remote index baseline.
//!
//! Pages through the index requesting only `id` and `file_mtime` and folds
//! the records into a [`RemoteState`]. A record without a numeric
//! `file_mtime` maps to [`MISSING_MTIME`], so any local copy of it looks
//! newer and gets re-indexed.

use crate::config::SearchConfig;
use crate::error::{BackendError, SyncError};
use crate::models::{RemoteState, MISSING_MTIME};
use crate::remote::SearchBackend;

pub struct IndexStateReader {
    page_size: usize,
}

impl IndexStateReader {
    pub fn new(config: &SearchConfig) -> Self {
        Self::with_page_size(config.page_size)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    /// Fetches the full id → mtime map.
    ///
    /// A missing index yields an empty map. Pagination stops on a page
    /// shorter than the page size, on an empty page, or once the offset
    /// reaches the `total` the backend reports.
    pub async fn read_state(&self, backend: &dyn SearchBackend) -> Result<RemoteState, SyncError> {
        let mut state = RemoteState::new();
        let mut offset = 0usize;

        loop {
            let page = match backend.fetch_documents(offset, self.page_size).await {
                Ok(page) => page,
                Err(BackendError::IndexNotFound) if offset == 0 => {
                    tracing::info!("index does not exist yet, starting from an empty baseline");
                    return Ok(state);
                }
                Err(e) => return Err(SyncError::RemoteState(e)),
            };

            // Records dropped for lacking an id still occupy the page.
            let count = page.fetched;
            for record in page.results {
                let mtime = record.file_mtime.unwrap_or_else(|| {
                    tracing::debug!(id = %record.id, "record has no numeric file_mtime, forcing re-index");
                    MISSING_MTIME
                });
                state.insert(record.id, mtime);
            }
            offset += count;

            if count == 0 || count < self.page_size {
                break;
            }
            if page.total.is_some_and(|total| offset as u64 >= total) {
                break;
            }
        }

        tracing::debug!(records = state.len(), "remote baseline loaded");
        Ok(state)
    }
}
