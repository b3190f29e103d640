// src/errors.rs

//! Crate-wide error types.
//!
//! Each subsystem has its own error enum so callers can match on the cases
//! they care about (`ShellError::TimedOut`, `CheckError::Network`, ...).
//! [`PhpmonError`] rolls them up for code that only needs to propagate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures of the process-execution layer.
///
/// A non-zero exit code or a signal-terminated process is *not* an error;
/// both are reported through `ShellOutput::status`.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("failed to launch `{command}`: {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("IO error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ShellError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ShellError::TimedOut { .. })
    }
}

/// Failures of the durable key-value store used by the update scheduler.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on store {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path:?} is not valid TOML: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not encode store contents: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid value for key `{key}`: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum PhpmonError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("{0} is already installed")]
    AlreadyInstalled(&'static str),

    #[error("update scheduler worker has stopped")]
    SchedulerStopped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PhpmonError>;
