//! Read-only encoding audit.
//!
//! Finds text files under a directory that do not decode as UTF-8 and, for
//! each, names the first candidate encoding that would decode it. Nothing is
//! rewritten; the sync pipeline decodes such files on the fly.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use walkdir::WalkDir;

use crate::extract::{decode_text, TextEncoding};

/// Extensions treated as text by the audit.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "html", "htm", "css", "js", "json", "xml", "csv"];

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Decodes with this non-UTF-8 candidate.
    Decodes(TextEncoding),
    /// No candidate decodes the file.
    Undecodable,
    /// The file could not be read.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditFinding {
    pub path: PathBuf,
    pub verdict: Verdict,
}

#[derive(Debug, Default)]
pub struct AuditReport {
    /// Text files examined.
    pub checked: usize,
    /// Files that are not valid UTF-8, in walk order.
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            TEXT_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Audits every text file under `dir`.
///
/// `encodings` are tried in order after UTF-8 has failed; a UTF-8 entry in
/// the list is ignored.
pub fn audit_encodings(dir: &Path, encodings: &[TextEncoding]) -> Result<AuditReport> {
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }

    let fallbacks: Vec<TextEncoding> = encodings
        .iter()
        .copied()
        .filter(|e| *e != TextEncoding::Utf8)
        .collect();
    let mut report = AuditReport::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_text_file(entry.path()) {
            continue;
        }

        report.checked += 1;
        let verdict = match std::fs::read(entry.path()) {
            Ok(bytes) if TextEncoding::Utf8.decode(&bytes).is_some() => continue,
            Ok(bytes) => match decode_text(&bytes, &fallbacks) {
                Ok((_, encoding)) => Verdict::Decodes(encoding),
                Err(_) => Verdict::Undecodable,
            },
            Err(e) => Verdict::Unreadable(e.to_string()),
        };
        tracing::warn!(file = %entry.path().display(), verdict = ?verdict, "file is not UTF-8");
        report.findings.push(AuditFinding {
            path: entry.into_path(),
            verdict,
        });
    }

    tracing::info!(checked = report.checked, not_utf8 = report.findings.len(), "encoding audit finished");
    Ok(report)
}
