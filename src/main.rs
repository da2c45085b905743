//! # docsync CLI
//!
//! ## Usage
//!
//! ```bash
//! docsync --config ./config/docsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsync sync` | Reconcile the storage root with the search index |
//! | `docsync sync --dry-run` | Show what a sync would change, without writing |
//! | `docsync sync --json` | Print the run report as JSON |
//! | `docsync health` | Check that the search backend is reachable |
//! | `docsync audit-encoding [DIR]` | List text files that are not UTF-8 |
//!
//! `LOCAL_STORAGE_PATH`, `MEILI_URL`, and `MEILI_API_KEY` override the
//! corresponding config keys.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use docsync::audit::{self, Verdict};
use docsync::config::{self, Config};
use docsync::logging;
use docsync::models::SyncReport;
use docsync::remote::{MeiliClient, SearchBackend};
use docsync::sync::{Reconciler, RunMode};

const DEFAULT_CONFIG_PATH: &str = "./config/docsync.toml";

/// Keeps a Meilisearch index in step with a document directory.
#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Keeps a Meilisearch index in step with a directory of txt, pdf, and epub files",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docsync.toml`. When the default file does not
    /// exist, built-in defaults are used; an explicitly given path must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the storage root with the search index.
    ///
    /// Adds new files, re-indexes changed ones, and removes index entries
    /// whose file is gone. Files that fail to extract or upload are skipped
    /// and picked up again by the next run.
    Sync {
        /// Compute and print the plan without extracting or writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print the report as a JSON object instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Check that the search backend is reachable.
    Health,

    /// List text files that are not valid UTF-8.
    ///
    /// Read-only. For each file, names the first configured encoding that
    /// decodes it.
    AuditEncoding {
        /// Directory to audit. Defaults to the storage root.
        dir: Option<PathBuf>,
    },
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path, true),
        None => config::load_config(Path::new(DEFAULT_CONFIG_PATH), false),
    }
}

fn print_report(report: &SyncReport) {
    let label = if report.dry_run { "sync (dry run)" } else { "sync" };
    println!("{} {}", label, if report.has_failures() { "finished with failures" } else { "ok" });
    println!("  added:         {}", report.added);
    println!("  updated:       {}", report.updated);
    println!("  deleted:       {}", report.deleted);
    println!("  unchanged:     {}", report.skipped);
    if !report.dry_run {
        println!("  errored:       {}", report.errored);
        println!("  upload failed: {}", report.upload_failed);
        println!("  delete failed: {}", report.delete_failed);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load(cli.config.as_deref())?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Sync { dry_run, json } => {
            let backend: Arc<dyn SearchBackend> = Arc::new(MeiliClient::new(&cfg.search)?);
            let mode = if dry_run { RunMode::DryRun } else { RunMode::Apply };
            let report = Reconciler::new(&cfg, backend)?.run(mode).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Health => {
            let client = MeiliClient::new(&cfg.search)?;
            let status = client.health().await?;
            println!("{} ({}): {}", cfg.search.url, client.index(), status);
        }
        Commands::AuditEncoding { dir } => {
            let dir = dir.unwrap_or_else(|| cfg.storage.root.clone());
            let report = audit::audit_encodings(&dir, &cfg.extract.encodings)?;
            for finding in &report.findings {
                let verdict = match &finding.verdict {
                    Verdict::Decodes(encoding) => format!("decodes as {}", encoding.label()),
                    Verdict::Undecodable => "no candidate encoding decodes it".to_string(),
                    Verdict::Unreadable(reason) => format!("unreadable: {}", reason),
                };
                println!("{}  {}", finding.path.display(), verdict);
            }
            println!(
                "checked {} text files, {} not UTF-8",
                report.checked,
                report.findings.len()
            );
        }
    }

    Ok(())
}
