// src/exec/runner.rs

//! The capability interface shared by the real and fake runners.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::ShellError;

use super::types::{Command, ExitStatus, ShellOutput, StreamChunk};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked for every chunk `attach` receives.
///
/// It is only ever called from the `attach` future itself, never after that
/// future has completed or been dropped.
pub type ChunkHandler<'a> = Box<dyn FnMut(&StreamChunk) + Send + 'a>;

pub type ShellResult = Result<ShellOutput, ShellError>;

/// Runs shell commands.
///
/// Production code uses [`RealShell`](super::RealShell); tests swap in a
/// [`FakeShell`](super::FakeShell) that replays scripted output without
/// spawning anything.
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion, blocking the calling thread.
    ///
    /// Do not call this from an async task without `spawn_blocking`.
    fn sync(&self, command: &Command) -> ShellResult;

    /// Run `command` to completion without blocking the calling thread.
    fn pipe<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, ShellResult>;

    /// Run `command`, delivering output to `on_chunk` as it arrives.
    ///
    /// If `timeout` elapses first the process tree is killed and the call
    /// fails with [`ShellError::TimedOut`]; output captured so far is
    /// discarded.
    fn attach<'a>(
        &'a self,
        command: &'a Command,
        on_chunk: ChunkHandler<'a>,
        timeout: Duration,
    ) -> BoxFuture<'a, ShellResult>;

    /// Run `command` for its side effects only.
    ///
    /// The output is recorded under the `phpmon::diagnostics` target and
    /// otherwise discarded. Failures are logged, never returned.
    fn quiet<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match self.pipe(command).await {
                Ok(output) => record_diagnostics(command, &output),
                Err(err @ ShellError::LaunchFailed { .. }) => {
                    warn!(
                        target: "phpmon::diagnostics",
                        cmd = %command,
                        error = %err,
                        "quiet command could not start"
                    );
                    record_diagnostics(
                        command,
                        &ShellOutput {
                            out: String::new(),
                            err: err.to_string(),
                            status: ExitStatus::LaunchFailed,
                        },
                    );
                }
                Err(err) => warn!(
                    target: "phpmon::diagnostics",
                    cmd = %command,
                    error = %err,
                    "quiet command failed"
                ),
            }
        })
    }
}

/// Fire-and-forget variant of [`ProcessRunner::quiet`].
pub fn spawn_quiet(runner: Arc<dyn ProcessRunner>, command: Command) -> JoinHandle<()> {
    tokio::spawn(async move {
        runner.quiet(&command).await;
    })
}

fn record_diagnostics(command: &Command, output: &ShellOutput) {
    debug!(
        target: "phpmon::diagnostics",
        cmd = %command,
        status = %output.status,
        stdout = %output.out.trim_end(),
        stderr = %output.err.trim_end(),
        "quiet command finished"
    );
}
