//! Local state scanner.
//!
//! Walks the document root and records the modification time of every
//! supported file, keyed by base name. The walk is sorted by file name so
//! that when two files share a base name, which one wins is deterministic.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::error::SyncError;
use crate::extract;
use crate::models::{LocalFile, LocalState};

const DEFAULT_EXCLUDES: [&str; 1] = ["**/.git/**"];

/// Result of a directory walk.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub state: LocalState,
    /// One handle per id, sorted by id.
    pub files: Vec<LocalFile>,
    /// Base names seen more than once during the walk.
    pub collisions: Vec<String>,
}

/// Scanner for the configured document root.
pub struct LocalStateScanner {
    root: PathBuf,
    follow_symlinks: bool,
    exclude_set: GlobSet,
}

impl LocalStateScanner {
    pub fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            follow_symlinks: config.follow_symlinks,
            exclude_set: build_globset(&excludes)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the root and returns the local state.
    ///
    /// Fails only when the root itself is not a readable directory; files
    /// that vanish mid-walk and unreadable subdirectories are logged and
    /// skipped.
    pub fn scan(&self) -> Result<ScanResult, SyncError> {
        let root = &self.root;
        let scan_error = |reason: String| SyncError::Scan {
            root: root.clone(),
            reason,
        };

        let metadata = std::fs::metadata(root).map_err(|e| scan_error(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(scan_error("not a directory".to_string()));
        }
        std::fs::read_dir(root).map_err(|e| scan_error(e.to_string()))?;

        let mut by_id: BTreeMap<String, LocalFile> = BTreeMap::new();
        let mut collisions = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable path during scan");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !extract::is_supported(path) {
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.exclude_set.is_match(relative) {
                continue;
            }
            let Some(id) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };

            let mtime = match entry.metadata() {
                Ok(meta) => mtime_secs(meta.modified().ok()),
                Err(e) if e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                    tracing::warn!(file = %path.display(), "file disappeared during scan, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "cannot stat file, skipping");
                    continue;
                }
            };

            let file = LocalFile {
                id: id.clone(),
                path: path.to_path_buf(),
                mtime,
            };
            if let Some(previous) = by_id.insert(id.clone(), file) {
                tracing::warn!(
                    id = %id,
                    shadowed = %previous.path.display(),
                    winner = %path.display(),
                    "duplicate file name under root; only the last one seen is indexed"
                );
                collisions.push(id);
            }
        }

        let state = by_id
            .iter()
            .map(|(id, file)| (id.clone(), file.mtime))
            .collect();
        let files = by_id.into_values().collect();

        Ok(ScanResult {
            state,
            files,
            collisions,
        })
    }
}

/// Seconds since the Unix epoch, fractional. Pre-epoch or unknown times map to 0.
pub fn mtime_secs(modified: Option<SystemTime>) -> f64 {
    modified
        .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
