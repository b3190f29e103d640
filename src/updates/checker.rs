// src/updates/checker.rs

//! What "checking for updates" means.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::exec::{BoxFuture, Command, ProcessRunner};

use super::core::FailureKind;

/// Matches the first `major.minor[.patch]` version in a response.
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.\d+(?:\.\d+)?)").expect("version regex is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("network error: {0}")]
    Network(String),

    #[error("could not parse update response: {0}")]
    Parse(String),
}

impl CheckError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckError::Network(_) => FailureKind::Network,
            CheckError::Parse(_) => FailureKind::Parse,
        }
    }
}

/// The newest version the update source reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableVersion {
    pub version: String,
}

pub trait UpdateChecker: Send + Sync {
    fn check(&self) -> BoxFuture<'_, Result<AvailableVersion, CheckError>>;
}

/// Checks for updates by running a shell command (typically `curl`) and
/// reading a version number from its stdout.
///
/// - launch failure, timeout or non-zero exit → [`CheckError::Network`]
/// - no version in the output → [`CheckError::Parse`]
pub struct CommandUpdateChecker {
    runner: Arc<dyn ProcessRunner>,
    command: Command,
}

impl CommandUpdateChecker {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: Command) -> Self {
        Self { runner, command }
    }
}

impl UpdateChecker for CommandUpdateChecker {
    fn check(&self) -> BoxFuture<'_, Result<AvailableVersion, CheckError>> {
        Box::pin(async move {
            let output = self
                .runner
                .pipe(&self.command)
                .await
                .map_err(|err| CheckError::Network(err.to_string()))?;

            if !output.success() {
                return Err(CheckError::Network(format!(
                    "`{}` finished with {}: {}",
                    self.command,
                    output.status,
                    output.err.trim()
                )));
            }

            let version = parse_version(&output.out)
                .ok_or_else(|| CheckError::Parse(truncate(output.out.trim(), 80)))?;

            debug!(cmd = %self.command, %version, "update source responded");
            Ok(AvailableVersion { version })
        })
    }
}

impl std::fmt::Debug for CommandUpdateChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandUpdateChecker")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

pub fn parse_version(text: &str) -> Option<String> {
    VERSION_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
