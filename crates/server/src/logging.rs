//! Tracing subscriber setup from the `logging` config section.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trc_core::config::{LogLevel, LoggingConfig};

/// Decide between human-readable and JSON output.
///
/// An explicit `logging.pretty` wins. Otherwise CI runs and `TRC_ENV=production`
/// get JSON, everything else gets pretty output.
pub fn resolve_pretty(configured: Option<bool>, env: &HashMap<String, String>) -> bool {
    if let Some(pretty) = configured {
        return pretty;
    }
    let ci = env
        .get("CI")
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
    let production = env
        .get("TRC_ENV")
        .is_some_and(|v| v.eq_ignore_ascii_case("production"));
    !(ci || production)
}

/// Level filter: a usable `RUST_LOG` overrides the configured level.
pub fn build_filter(level: LogLevel, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_filter()))
}

/// Install the global subscriber.
pub fn init_tracing(config: &LoggingConfig, env: &HashMap<String, String>) -> Result<()> {
    let filter = build_filter(config.level, env.get("RUST_LOG").map(String::as_str));
    let pretty = resolve_pretty(config.pretty, env);

    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty.then(|| fmt::layer()))
        .with((!pretty).then(|| fmt::layer().json()))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
