//! Reconciliation run orchestration.
//!
//! Coordinates the full sync flow: local scan → remote baseline → diff →
//! extraction → upsert → delete. Only the first two phases can abort a run;
//! from the diff onwards every failure is per file or per chunk, is logged,
//! and shows up in the [`SyncReport`] counts instead.
//!
//! ```text
//! ScanningLocal → ReadingRemoteState → Diffing → Extracting → Uploading → Deleting → Done
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::config::Config;
use crate::diff::{diff, SyncPlan};
use crate::error::SyncError;
use crate::extract::ContentExtractor;
use crate::models::{Document, LocalFile, SyncReport};
use crate::remote::SearchBackend;
use crate::remote_state::IndexStateReader;
use crate::scanner::LocalStateScanner;
use crate::uploader::BatchUploader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Apply the plan to the remote index.
    Apply,
    /// Stop after diffing and report what would change.
    DryRun,
}

/// Phases of a reconciliation run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    ScanningLocal,
    ReadingRemoteState,
    Diffing,
    Extracting,
    Uploading,
    Deleting,
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::ScanningLocal => "scanning-local",
            SyncPhase::ReadingRemoteState => "reading-remote-state",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Extracting => "extracting",
            SyncPhase::Uploading => "uploading",
            SyncPhase::Deleting => "deleting",
            SyncPhase::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(phase: SyncPhase) {
    tracing::info!(%phase, "sync phase");
}

/// Documents that extracted cleanly, plus per-file failure counts.
#[derive(Debug, Default)]
struct Extraction {
    documents: Vec<Document>,
    errored: usize,
    not_applicable: usize,
}

/// Drives one reconciliation run against a search backend.
pub struct Reconciler {
    scanner: LocalStateScanner,
    reader: IndexStateReader,
    extractor: ContentExtractor,
    uploader: BatchUploader,
    workers: usize,
    backend: Arc<dyn SearchBackend>,
}

impl Reconciler {
    pub fn new(config: &Config, backend: Arc<dyn SearchBackend>) -> anyhow::Result<Self> {
        Ok(Self {
            scanner: LocalStateScanner::new(&config.storage)?,
            reader: IndexStateReader::new(&config.search),
            extractor: ContentExtractor::new(&config.extract),
            uploader: BatchUploader::new(&config.search),
            workers: config.extract.workers.max(1),
            backend,
        })
    }

    /// Replaces the uploader, e.g. to drop the inter-chunk pause.
    pub fn with_uploader(mut self, uploader: BatchUploader) -> Self {
        self.uploader = uploader;
        self
    }

    /// Runs the reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error only if the document root cannot be scanned or the
    /// remote baseline cannot be read. Every later failure is counted in
    /// the returned report.
    pub async fn run(&self, mode: RunMode) -> Result<SyncReport, SyncError> {
        let backend = self.backend.as_ref();

        enter(SyncPhase::ScanningLocal);
        let scan = self.scanner.scan()?;
        tracing::info!(
            root = %self.scanner.root().display(),
            files = scan.files.len(),
            collisions = scan.collisions.len(),
            "local scan complete"
        );

        enter(SyncPhase::ReadingRemoteState);
        let remote = self.reader.read_state(backend).await?;

        enter(SyncPhase::Diffing);
        let plan = diff(&scan.state, &remote);
        tracing::info!(
            to_add = plan.to_add.len(),
            to_update = plan.to_update.len(),
            to_delete = plan.to_delete.len(),
            unchanged = plan.unchanged.len(),
            "diff computed"
        );
        if plan.is_noop() {
            tracing::info!("index already matches the storage root");
        }

        let mut report = SyncReport {
            skipped: plan.unchanged.len(),
            dry_run: mode == RunMode::DryRun,
            ..SyncReport::default()
        };

        if mode == RunMode::DryRun {
            report.added = plan.to_add.len();
            report.updated = plan.to_update.len();
            report.deleted = plan.to_delete.len();
            enter(SyncPhase::Done);
            return Ok(report);
        }

        enter(SyncPhase::Extracting);
        let pending: Vec<LocalFile> = scan
            .files
            .into_iter()
            .filter(|file| plan.needs_processing(&file.id))
            .collect();
        let extraction = self.extract_all(pending).await;
        report.errored = extraction.errored;
        report.skipped += extraction.not_applicable;

        enter(SyncPhase::Uploading);
        let SyncPlan {
            to_add, to_delete, ..
        } = plan;
        let upserted = self.uploader.upsert(backend, extraction.documents).await;
        for id in &upserted.accepted {
            if to_add.contains(id) {
                report.added += 1;
            } else {
                report.updated += 1;
            }
        }
        report.upload_failed = upserted.failed.len();

        enter(SyncPhase::Deleting);
        let deleted = self
            .uploader
            .delete(backend, to_delete.into_iter().collect())
            .await;
        report.deleted = deleted.accepted.len();
        report.delete_failed = deleted.failed.len();

        enter(SyncPhase::Done);
        tracing::info!(
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            errored = report.errored,
            deleted = report.deleted,
            upload_failed = report.upload_failed,
            delete_failed = report.delete_failed,
            "sync finished"
        );
        Ok(report)
    }

    /// Extracts `files` on the blocking pool, at most `workers` at a time.
    async fn extract_all(&self, files: Vec<LocalFile>) -> Extraction {
        let mut extraction = Extraction::default();
        let extractor = self.extractor.clone();
        let joined = run_bounded(files, self.workers, move |file: LocalFile| {
            let result = extractor.extract_document(&file);
            (file, result)
        })
        .await;

        for result in joined {
            match result {
                Ok((_, Ok(Some(document)))) => extraction.documents.push(document),
                Ok((file, Ok(None))) => {
                    tracing::debug!(file = %file.path.display(), "no extractor for file, skipping");
                    extraction.not_applicable += 1;
                }
                Ok((file, Err(e))) => {
                    tracing::warn!(id = %file.id, file = %file.path.display(), error = %e, "extraction failed, skipping file");
                    extraction.errored += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "extraction task aborted, skipping file");
                    extraction.errored += 1;
                }
            }
        }

        // Completion order is arbitrary; chunk in id order.
        extraction.documents.sort_by(|a, b| a.id.cmp(&b.id));
        extraction
    }
}

/// Runs `job` over `items` on the blocking pool with at most `workers`
/// jobs in flight. Results come back in completion order.
async fn run_bounded<T, R, F>(items: Vec<T>, workers: usize, job: F) -> Vec<Result<R, JoinError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Clone + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for item in items {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let job = job.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            job(item)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined);
    }
    results
}
