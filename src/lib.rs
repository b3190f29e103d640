// src/lib.rs

pub mod cell;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod updates;
pub mod watch;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::{CliArgs, CliCommand};
use crate::config::{ConfigFile, load_or_default};
use crate::exec::{
    ChunkHandler, Command, FakeScript, FakeShell, ProcessRunner, RealShell, Stream, StreamChunk,
};
use crate::updates::{
    CommandUpdateChecker, FileStore, KeyValueStore, MemoryStore, SchedulerDeps, UpdateScheduler,
};
use crate::watch::{EventMask, FsNotifier};

pub use crate::cell::ThreadSafeCell;
pub use crate::debounce::Debouncer;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, installs the process runner and dispatches to the
/// subcommand. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_or_default(args.config.as_deref())?;
    debug!(?cfg, "configuration loaded");

    let real: Arc<dyn ProcessRunner> = Arc::new(RealShell::new(cfg.shell.clone()));
    exec::registry::install(Arc::clone(&real))?;

    match args.command {
        CliCommand::Exec { command, timeout } => {
            run_attached(real.as_ref(), Command::new(command), timeout).await
        }
        CliCommand::Fake {
            script,
            command,
            slow,
            timeout,
        } => {
            let fake = load_fake_shell(&script)?;
            fake.set_slow_mode(slow);
            run_attached(&fake, Command::new(command), timeout).await
        }
        CliCommand::Watch {
            path,
            mask,
            debounce,
        } => {
            let window = debounce.or(cfg.watch.debounce).filter(|d| !d.is_zero());
            watch_until_interrupted(&path, mask, window).await?;
            Ok(0)
        }
        CliCommand::Updates {
            check_command,
            store,
        } => {
            schedule_until_interrupted(&cfg, real, check_command, store).await?;
            Ok(0)
        }
    }
}

fn load_fake_shell(script: &Path) -> Result<FakeShell> {
    let script = FakeScript::load(script)
        .with_context(|| format!("loading fake script {script:?}"))?;
    info!(commands = script.len(), "fake script loaded");
    Ok(FakeShell::new(script))
}

/// Stream a command's output to our own stdout/stderr and mirror its exit
/// code.
async fn run_attached(runner: &dyn ProcessRunner, command: Command, timeout: Duration) -> Result<i32> {
    let on_chunk: ChunkHandler<'_> = Box::new(|chunk: &StreamChunk| {
        // Output is best-effort; a closed terminal is not worth failing over.
        let _ = match chunk.stream {
            Stream::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(chunk.text.as_bytes()).and_then(|_| out.flush())
            }
            Stream::Stderr => std::io::stderr().lock().write_all(chunk.text.as_bytes()),
        };
    });

    let output = runner.attach(&command, on_chunk, timeout).await?;
    info!(cmd = %command, status = %output.status, "command finished");

    Ok(match output.status {
        exec::ExitStatus::Exited(code) => code,
        exec::ExitStatus::Signaled(signal) => 128 + signal.unwrap_or(0),
        exec::ExitStatus::LaunchFailed => 127,
    })
}

async fn watch_until_interrupted(path: &Path, mask: EventMask, debounce: Option<Duration>) -> Result<()> {
    let changes = Arc::new(AtomicU64::new(0));

    let mut builder = FsNotifier::builder(path).mask(mask);
    if let Some(window) = debounce {
        builder = builder.debounce(window);
    }

    let counter = Arc::clone(&changes);
    let display = path.display().to_string();
    let notifier = builder
        .start(move || {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            println!("{display} changed ({n})");
        })
        .with_context(|| format!("watching {path:?}"))?;

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;

    notifier.terminate();
    info!(changes = changes.load(Ordering::Relaxed), "watch stopped");
    Ok(())
}

async fn schedule_until_interrupted(
    cfg: &ConfigFile,
    runner: Arc<dyn ProcessRunner>,
    check_command: Option<String>,
    store_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let check_command = check_command
        .or_else(|| cfg.updates.check_command.clone())
        .context("no update check command configured ([updates].check_command or --check-command)")?;

    let store: Arc<dyn KeyValueStore> = match store_path.or_else(|| cfg.updates.store_path.clone()) {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    let checker = Arc::new(CommandUpdateChecker::new(runner, Command::new(check_command)));
    let enabled = cfg.updates.enabled;
    let deps = SchedulerDeps::new(checker, store).with_preference(Arc::new(move || enabled));

    let scheduler = UpdateScheduler::spawn(cfg.updates.policy.clone(), deps).install()?;
    scheduler.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;

    let snapshot = scheduler.snapshot().await?;
    info!(
        phase = ?snapshot.phase,
        failure_count = snapshot.failure_count,
        checks_run = snapshot.checks_run,
        "stopping update scheduler"
    );
    scheduler.shutdown().await?;
    Ok(())
}
