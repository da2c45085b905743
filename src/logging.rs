//! Structured logging setup.
//!
//! Logs go to stderr so that stdout carries only command output. `RUST_LOG`,
//! when set, replaces the configured level entirely.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Filter directive for a bare level: this crate at `level`, HTTP internals at warn.
fn default_directives(level: &str) -> String {
    format!(
        "{}={level},hyper=warn,reqwest=warn,h2=warn,lopdf=error",
        env!("CARGO_CRATE_NAME")
    )
}

fn build_filter(config: &LoggingConfig, env_override: Option<String>) -> Result<EnvFilter> {
    let directives = match env_override {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ => default_directives(config.level.trim()),
    };
    EnvFilter::try_new(&directives).map_err(|e| anyhow!("invalid log filter '{}': {}", directives, e))
}

/// Installs the global subscriber.
///
/// Fails if the filter does not parse or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config, std::env::var(EnvFilter::DEFAULT_ENV).ok())?;

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .map_err(|e| anyhow!("failed to initialize logging: {}", e))
}
