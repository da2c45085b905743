//! # docsync
//!
//! Keeps a Meilisearch index in step with a directory of documents.
//!
//! Each run compares the modification times of the `.txt`, `.pdf`, and
//! `.epub` files under the storage root with the `file_mtime` recorded in
//! the index, extracts text from new and changed files, upserts them in
//! paced chunks, and deletes index entries whose file is gone. A file that
//! fails to extract or upload is skipped and retried by the next run.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐                 ┌──────────────┐
//! │   Scanner   │──┐           ┌──│ Remote state │◀── Meilisearch
//! │ (walk root) │  │  ┌──────┐ │  │  (paginate)  │
//! └─────────────┘  └─▶│ Diff │◀┘  └──────────────┘
//!                     └──┬───┘
//!                        ▼
//!                 ┌─────────────┐   ┌────────────┐
//!                 │  Extractor  │──▶│  Uploader  │──▶ Meilisearch
//!                 │ txt/pdf/epub│   │  (chunks)  │
//!                 └─────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Documents, state maps, and the run report |
//! | [`error`] | Error types |
//! | [`scanner`] | Local state from the document root |
//! | [`extract`] | Text extraction and encoding fallback |
//! | [`remote`] | Search backend trait, HTTP client, in-memory index |
//! | [`remote_state`] | Remote baseline reader |
//! | [`diff`] | Add / update / delete classification |
//! | [`uploader`] | Chunked, paced upserts and deletes |
//! | [`sync`] | Run orchestration |
//! | [`audit`] | Read-only encoding audit |
//! | [`logging`] | Subscriber setup |

pub mod audit;
pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod logging;
pub mod models;
pub mod remote;
pub mod remote_state;
pub mod scanner;
pub mod sync;
pub mod uploader;
