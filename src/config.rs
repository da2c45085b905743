//! Configuration loading and validation.
//!
//! Configuration is read once at process start from a TOML file, patched with
//! environment overrides, validated, and then passed by reference into each
//! component constructor. Every section has defaults, so an empty file (or no
//! file at all) yields a usable configuration pointing at `/mnt/storage` and
//! `http://meilisearch:7700`.
//!
//! # Environment Variables
//!
//! - `LOCAL_STORAGE_PATH` overrides `storage.root`
//! - `MEILI_URL` overrides `search.url`
//! - `MEILI_API_KEY` overrides `search.api_key`

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extract::TextEncoding;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/mnt/storage")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub wait_for_tasks: bool,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            index: default_index(),
            api_key: None,
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            timeout_secs: default_timeout_secs(),
            wait_for_tasks: false,
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

impl SearchConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// How long to wait for an accepted task, or `None` when not waiting.
    pub fn task_wait(&self) -> Option<Duration> {
        self.wait_for_tasks
            .then(|| Duration::from_secs(self.task_timeout_secs))
    }
}

fn default_url() -> String {
    "http://meilisearch:7700".to_string()
}
fn default_index() -> String {
    "documents".to_string()
}
fn default_page_size() -> usize {
    1000
}
fn default_batch_size() -> usize {
    100
}
fn default_batch_pause_ms() -> u64 {
    200
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_task_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_encodings")]
    pub encodings: Vec<TextEncoding>,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            encodings: default_encodings(),
            workers: default_workers(),
        }
    }
}

fn default_encodings() -> Vec<TextEncoding> {
    vec![
        TextEncoding::Utf8,
        TextEncoding::Windows1251,
        TextEncoding::Latin1,
    ]
}
fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Loads configuration from `path`.
///
/// When `required` is false and the file does not exist, defaults are used.
/// Environment overrides are applied before validation either way.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    let mut config: Config = if path.exists() || required {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Applies `LOCAL_STORAGE_PATH`, `MEILI_URL`, and `MEILI_API_KEY`.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(root) = var("LOCAL_STORAGE_PATH").filter(|v| !v.is_empty()) {
        config.storage.root = PathBuf::from(root);
    }
    if let Some(url) = var("MEILI_URL").filter(|v| !v.is_empty()) {
        config.search.url = url;
    }
    if let Some(key) = var("MEILI_API_KEY").filter(|v| !v.is_empty()) {
        config.search.api_key = Some(key);
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.search.page_size == 0 {
        anyhow::bail!("search.page_size must be > 0");
    }
    if config.search.batch_size == 0 {
        anyhow::bail!("search.batch_size must be > 0");
    }
    if config.search.index.trim().is_empty() {
        anyhow::bail!("search.index must not be empty");
    }
    reqwest::Url::parse(&config.search.url)
        .with_context(|| format!("search.url is not a valid URL: '{}'", config.search.url))?;

    if config.extract.encodings.is_empty() {
        anyhow::bail!("extract.encodings must list at least one encoding");
    }
    if config.extract.workers == 0 {
        anyhow::bail!("extract.workers must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/mnt/storage"));
        assert_eq!(config.search.url, "http://meilisearch:7700");
        assert_eq!(config.search.index, "documents");
        assert_eq!(config.search.page_size, 1000);
        assert_eq!(config.search.batch_size, 100);
        assert_eq!(
            config.extract.encodings,
            vec![
                TextEncoding::Utf8,
                TextEncoding::Windows1251,
                TextEncoding::Latin1
            ]
        );
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.search.task_wait().is_none());
        validate(&config).unwrap();
    }

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
[storage]
root = "/srv/books"
exclude_globs = ["**/drafts/**"]

[search]
url = "http://localhost:7700"
index = "books"
api_key = "secret"
batch_size = 50
batch_pause_ms = 0
wait_for_tasks = true
task_timeout_secs = 5

[extract]
encodings = ["utf-8", "cp1251"]
workers = 2

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/srv/books"));
        assert_eq!(config.storage.exclude_globs, vec!["**/drafts/**"]);
        assert_eq!(config.search.api_key.as_deref(), Some("secret"));
        assert_eq!(config.search.batch_size, 50);
        assert_eq!(config.search.batch_pause(), Duration::ZERO);
        assert_eq!(config.search.task_wait(), Some(Duration::from_secs(5)));
        assert_eq!(
            config.extract.encodings,
            vec![TextEncoding::Utf8, TextEncoding::Windows1251]
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_encoding() {
        let err = parse_config("[extract]\nencodings = [\"ebcdic\"]\n").unwrap_err();
        assert!(format!("{:#}", err).contains("ebcdic"));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = parse_config("[search]\nbatch_size = 0\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn rejects_empty_encoding_list() {
        let config = parse_config("[extract]\nencodings = []\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = parse_config("[storage]\nroot = \"/from/file\"\n").unwrap();
        apply_env_overrides(&mut config, |key| match key {
            "LOCAL_STORAGE_PATH" => Some("/from/env".to_string()),
            "MEILI_API_KEY" => Some("k".to_string()),
            "MEILI_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.storage.root, PathBuf::from("/from/env"));
        assert_eq!(config.search.api_key.as_deref(), Some("k"));
        assert_eq!(config.search.url, "http://meilisearch:7700");
    }

    #[test]
    fn missing_optional_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(&path, false).unwrap();
        assert_eq!(config.search.index, "documents");
        assert!(load_config(&path, true).is_err());
    }

    #[test]
    fn shipped_example_is_valid() {
        let config = parse_config(include_str!("../config/docsync.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.search.batch_size, 100);
    }
}
