// src/logging.rs

//! Diagnostics go to stderr; `exec` output owns stdout.
//!
//! `--log-level` beats `PHPMON_LOG`, which beats the built-in `info`.
//! `PHPMON_LOG` takes full filter directives, so
//! `PHPMON_LOG=phpmon_runtime::updates=trace` narrows to the scheduler.

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "PHPMON_LOG";

/// The watcher backend logs every raw event at debug; keep it quiet unless
/// a directive names it.
const QUIET_DEPENDENCIES: &str = "notify=warn";

/// Where the effective filter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSource {
    Flag(LogLevel),
    Env(String),
    /// `PHPMON_LOG` was set but did not parse; the default is used.
    RejectedEnv(String),
    Default,
}

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let (filter, source) = build_filter(cli_level, env_value.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    if let FilterSource::RejectedEnv(value) = &source {
        tracing::warn!(%value, "ignoring unparseable {LOG_ENV}; logging at info");
    }
    tracing::debug!(?source, "logging initialised");
    Ok(())
}

/// Resolve the subscriber filter from the CLI flag and the raw value of
/// `PHPMON_LOG`.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> (EnvFilter, FilterSource) {
    if let Some(level) = cli_level {
        return (with_quiet_dependencies(level_filter(level).to_string()), FilterSource::Flag(level));
    }

    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => match EnvFilter::try_new(value) {
            Ok(_) => (with_quiet_dependencies(value.to_string()), FilterSource::Env(value.to_string())),
            Err(_) => (default_filter(), FilterSource::RejectedEnv(value.to_string())),
        },
        None => (default_filter(), FilterSource::Default),
    }
}

pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

fn default_filter() -> EnvFilter {
    with_quiet_dependencies(LevelFilter::INFO.to_string())
}

// A user directive naming `notify` replaces ours.
fn with_quiet_dependencies(directives: String) -> EnvFilter {
    let combined = if directives.contains("notify") {
        directives
    } else {
        format!("{directives},{QUIET_DEPENDENCIES}")
    };
    EnvFilter::try_new(&combined).unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string()))
}
