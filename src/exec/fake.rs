// src/exec/fake.rs

//! Deterministic runner that replays scripted output instead of spawning
//! processes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cell::ThreadSafeCell;
use crate::errors::{PhpmonError, ShellError};

use super::runner::{BoxFuture, ChunkHandler, ProcessRunner, ShellResult};
use super::types::{Command, ExitStatus, ShellOutput, Stream, StreamChunk};

/// Text returned on stderr for any command the script does not know about.
pub const UNEXPECTED_COMMAND: &str = "Unexpected Command";

/// Exit code reported for unscripted commands (the shell's "not found").
pub const UNEXPECTED_COMMAND_EXIT_CODE: i32 = 127;

/// How much slow mode stretches scripted delays by default.
pub const DEFAULT_SLOW_FACTOR: u32 = 3;

/// One scripted piece of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeFragment {
    pub delay: Duration,
    pub text: String,
    pub stream: Stream,
}

impl FakeFragment {
    /// Stdout text delivered immediately.
    pub fn instant(text: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            text: text.into(),
            stream: Stream::Stdout,
        }
    }

    /// Stdout text delivered after `delay`.
    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        Self {
            delay,
            text: text.into(),
            stream: Stream::Stdout,
        }
    }

    pub fn on(mut self, stream: Stream) -> Self {
        self.stream = stream;
        self
    }
}

/// Exact command text → ordered output fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeScript {
    commands: BTreeMap<String, Vec<FakeFragment>>,
}

impl FakeScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, command: impl Into<String>, fragments: Vec<FakeFragment>) -> Self {
        self.commands.insert(command.into(), fragments);
        self
    }

    /// Shorthand: instant stdout, no error.
    pub fn with_output(self, command: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(command, vec![FakeFragment::instant(text)])
    }

    pub fn fragments(&self, command: &str) -> Option<&[FakeFragment]> {
        self.commands.get(command).map(Vec::as_slice)
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Parse a script from TOML:
    ///
    /// ```toml
    /// [commands]
    /// "php -v" = "PHP 8.3.0"
    /// "brew list" = [
    ///   { text = "Hello world\n" },
    ///   { delay_ms = 1000, text = "oops", stream = "stderr" },
    /// ]
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let raw: RawFakeScript = toml::from_str(contents)?;
        Ok(raw.into())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PhpmonError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&contents)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFakeScript {
    #[serde(default)]
    commands: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Text(String),
    Fragments(Vec<RawFragment>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFragment {
    #[serde(default)]
    delay_ms: u64,
    text: String,
    #[serde(default)]
    stream: Stream,
}

impl From<RawFakeScript> for FakeScript {
    fn from(raw: RawFakeScript) -> Self {
        let commands = raw
            .commands
            .into_iter()
            .map(|(command, entry)| {
                let fragments = match entry {
                    RawEntry::Text(text) => vec![FakeFragment::instant(text)],
                    RawEntry::Fragments(list) => list
                        .into_iter()
                        .map(|f| FakeFragment {
                            delay: Duration::from_millis(f.delay_ms),
                            text: f.text,
                            stream: f.stream,
                        })
                        .collect(),
                };
                (command, fragments)
            })
            .collect();

        FakeScript { commands }
    }
}

/// Runner that answers from a [`FakeScript`].
///
/// - `sync` synthesizes all fragments immediately.
/// - `pipe` and `attach` honor scripted delays in real time (scaled by slow
///   mode) and respect timeouts.
/// - Unscripted commands produce [`UNEXPECTED_COMMAND`] on stderr.
///
/// Every invocation is recorded so tests can assert on what was run.
#[derive(Debug)]
pub struct FakeShell {
    script: ThreadSafeCell<Arc<FakeScript>>,
    slow_mode: ThreadSafeCell<bool>,
    slow_factor: u32,
    invocations: Mutex<Vec<String>>,
}

impl FakeShell {
    pub fn new(script: FakeScript) -> Self {
        Self {
            script: ThreadSafeCell::new(Arc::new(script)),
            slow_mode: ThreadSafeCell::new(false),
            slow_factor: DEFAULT_SLOW_FACTOR,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_slow_factor(mut self, factor: u32) -> Self {
        self.slow_factor = factor.max(1);
        self
    }

    /// Replace the script for subsequent calls.
    pub fn set_script(&self, script: FakeScript) {
        self.script.set(Arc::new(script));
    }

    pub fn set_slow_mode(&self, enabled: bool) {
        self.slow_mode.set(enabled);
    }

    pub fn is_slow(&self) -> bool {
        self.slow_mode.get()
    }

    /// Commands run so far, in call order.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lookup(&self, command: &Command) -> Option<Vec<FakeFragment>> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.text().to_string());

        let script = self.script.get();
        let fragments = script.fragments(command.text()).map(<[_]>::to_vec);
        if fragments.is_none() {
            warn!(cmd = %command, "unscripted command invoked on fake shell");
        }
        fragments
    }

    fn scaled(&self, delay: Duration) -> Duration {
        if self.slow_mode.get() {
            delay * self.slow_factor
        } else {
            delay
        }
    }

    async fn replay(
        &self,
        fragments: Vec<FakeFragment>,
        on_chunk: &mut ChunkHandler<'_>,
    ) -> ShellOutput {
        let mut output = ShellOutput::empty();
        for fragment in fragments {
            let delay = self.scaled(fragment.delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let chunk = StreamChunk::new(fragment.stream, fragment.text);
            on_chunk(&chunk);
            output.append(&chunk);
        }
        output
    }

    async fn run_timed(
        &self,
        command: &Command,
        mut on_chunk: ChunkHandler<'_>,
        timeout: Option<Duration>,
    ) -> ShellResult {
        let Some(fragments) = self.lookup(command) else {
            let chunk = StreamChunk::new(Stream::Stderr, UNEXPECTED_COMMAND);
            on_chunk(&chunk);
            return Ok(unexpected_output());
        };

        let replay = self.replay(fragments, &mut on_chunk);
        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, replay).await.map_err(|_| {
                debug!(cmd = %command, "fake command timed out");
                ShellError::TimedOut {
                    command: command.text().to_string(),
                    timeout: limit,
                }
            })?,
            None => replay.await,
        };

        Ok(output)
    }
}

impl Default for FakeShell {
    fn default() -> Self {
        Self::new(FakeScript::default())
    }
}

impl ProcessRunner for FakeShell {
    fn sync(&self, command: &Command) -> ShellResult {
        let Some(fragments) = self.lookup(command) else {
            return Ok(unexpected_output());
        };

        let mut output = ShellOutput::empty();
        for fragment in fragments {
            output.append(&StreamChunk::new(fragment.stream, fragment.text));
        }
        Ok(output)
    }

    fn pipe<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, ShellResult> {
        Box::pin(self.run_timed(
            command,
            Box::new(|_: &StreamChunk| {}),
            command.timeout(),
        ))
    }

    fn attach<'a>(
        &'a self,
        command: &'a Command,
        on_chunk: ChunkHandler<'a>,
        timeout: Duration,
    ) -> BoxFuture<'a, ShellResult> {
        Box::pin(self.run_timed(command, on_chunk, Some(timeout)))
    }
}

fn unexpected_output() -> ShellOutput {
    ShellOutput {
        out: String::new(),
        err: UNEXPECTED_COMMAND.to_string(),
        status: ExitStatus::Exited(UNEXPECTED_COMMAND_EXIT_CODE),
    }
}
