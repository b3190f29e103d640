// src/exec/group.rs

//! Fan-out/fan-in helpers for running several commands at once.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::errors::ShellError;

use super::runner::{ProcessRunner, ShellResult};
use super::types::Command;

/// Run every command concurrently with `pipe` and wait for all of them.
///
/// Results come back in the same order as `commands`, regardless of which
/// finished first.
pub async fn pipe_all(runner: Arc<dyn ProcessRunner>, commands: Vec<Command>) -> Vec<ShellResult> {
    let mut set = JoinSet::new();
    for (index, command) in commands.iter().cloned().enumerate() {
        let runner = Arc::clone(&runner);
        set.spawn(async move { (index, runner.pipe(&command).await) });
    }

    collect_ordered(set, &commands).await
}

/// Like [`pipe_all`], but each command runs through the blocking `sync`
/// path on the blocking thread pool.
pub async fn sync_all(runner: Arc<dyn ProcessRunner>, commands: Vec<Command>) -> Vec<ShellResult> {
    let mut set = JoinSet::new();
    for (index, command) in commands.iter().cloned().enumerate() {
        let runner = Arc::clone(&runner);
        set.spawn_blocking(move || (index, runner.sync(&command)));
    }

    collect_ordered(set, &commands).await
}

async fn collect_ordered(
    mut set: JoinSet<(usize, ShellResult)>,
    commands: &[Command],
) -> Vec<ShellResult> {
    let mut slots: Vec<Option<ShellResult>> = commands.iter().map(|_| None).collect();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(err) => error!(error = %err, "command task failed to join"),
        }
    }

    debug!(count = commands.len(), "command group finished");

    slots
        .into_iter()
        .zip(commands)
        .map(|(slot, command)| {
            slot.unwrap_or_else(|| {
                Err(ShellError::Io {
                    command: command.text().to_string(),
                    source: std::io::Error::other("command task panicked or was cancelled"),
                })
            })
        })
        .collect()
}
