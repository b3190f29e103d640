// src/exec/types.rs

//! Values passed into and returned from a [`ProcessRunner`](super::ProcessRunner).

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// A shell-interpretable command line plus an optional per-call timeout.
///
/// The text is handed to the shell verbatim (`sh -l -c <text>`); there is no
/// separate argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    text: String,
    timeout: Option<Duration>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Command::new(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Command::new(text)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Which pipe a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    #[default]
    Stdout,
    Stderr,
}

/// A fragment of output delivered while a process is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub stream: Stream,
    pub text: String,
}

impl StreamChunk {
    pub fn new(stream: Stream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    /// Terminated by an uncaught signal (signal number when the OS reports
    /// one).
    Signaled(Option<i32>),
    /// Only produced by callers that swallow launch errors (see
    /// `ProcessRunner::quiet`); the runner itself returns
    /// `ShellError::LaunchFailed`.
    LaunchFailed,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        ExitStatus::Exited(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatus::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ExitStatus::Signaled(status.signal())
        }

        #[cfg(not(unix))]
        {
            ExitStatus::Signaled(None)
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {code}"),
            ExitStatus::Signaled(Some(signal)) => write!(f, "signal {signal}"),
            ExitStatus::Signaled(None) => f.write_str("signal"),
            ExitStatus::LaunchFailed => f.write_str("launch failed"),
        }
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub out: String,
    pub err: String,
    pub status: ExitStatus,
}

impl ShellOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when anything was written to stderr.
    ///
    /// Many tools print warnings to stderr and still exit 0, so this is
    /// deliberately independent of `status`.
    pub fn has_error(&self) -> bool {
        !self.err.is_empty()
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub(crate) fn append(&mut self, chunk: &StreamChunk) {
        match chunk.stream {
            Stream::Stdout => self.out.push_str(&chunk.text),
            Stream::Stderr => self.err.push_str(&chunk.text),
        }
    }
}
