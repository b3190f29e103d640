// src/exec/mod.rs

//! Process execution layer.
//!
//! Every external program is run through a shell via a [`ProcessRunner`]:
//!
//! - [`types`] holds `Command`, `ShellOutput`, `ExitStatus` and stream chunks.
//! - [`runner`] defines the `ProcessRunner` trait (`sync`, `pipe`, `attach`,
//!   `quiet`).
//! - [`real`] spawns OS processes in their own process group, streams both
//!   pipes into a single aggregator and kills the whole group on timeout.
//! - [`fake`] replays a `FakeScript` so tests never touch the OS.
//! - [`shell_command`] turns a command string into a shell invocation.
//! - [`registry`] is the process-wide runner handle.
//! - [`group`] runs several commands concurrently and joins them.

pub mod fake;
pub mod group;
pub mod real;
pub mod registry;
pub mod runner;
pub mod shell_command;
pub mod types;

pub use fake::{FakeFragment, FakeScript, FakeShell, UNEXPECTED_COMMAND};
pub use group::{pipe_all, sync_all};
pub use real::RealShell;
pub use runner::{BoxFuture, ChunkHandler, ProcessRunner, ShellResult, spawn_quiet};
pub use shell_command::ShellConfig;
pub use types::{Command, ExitStatus, ShellOutput, Stream, StreamChunk};
