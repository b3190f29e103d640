// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::parse_duration;
use crate::watch::EventMask;

/// Command-line arguments for `phpmon-runtime`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "phpmon-runtime",
    version,
    about = "Run shell commands, watch files and schedule update checks the way PHP Monitor does.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$PHPMON_CONFIG` if set, otherwise built-in defaults.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PHPMON_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Run a command through the configured shell, streaming its output.
    Exec {
        /// Shell command line, e.g. "brew services list".
        command: String,

        /// Kill the command if it runs longer than this (e.g. "30s").
        #[arg(long, value_parser = parse_duration_arg, default_value = "60s")]
        timeout: Duration,
    },

    /// Replay a command from a fake script instead of running it.
    Fake {
        /// TOML file with a `[commands]` table.
        #[arg(long, value_name = "FILE")]
        script: PathBuf,

        command: String,

        /// Stretch scripted delays.
        #[arg(long)]
        slow: bool,

        #[arg(long, value_parser = parse_duration_arg, default_value = "60s")]
        timeout: Duration,
    },

    /// Print a line every time a file changes, until Ctrl-C.
    Watch {
        path: PathBuf,

        /// Comma-separated events: write, delete, rename, all.
        #[arg(long, default_value = "write")]
        mask: EventMask,

        /// Override the configured debounce window ("0ms" disables).
        #[arg(long, value_parser = parse_duration_arg)]
        debounce: Option<Duration>,
    },

    /// Run the automatic update scheduler until Ctrl-C.
    Updates {
        /// Command printing the latest version (overrides the config).
        #[arg(long)]
        check_command: Option<String>,

        /// File for the persisted scheduler state (overrides the config).
        #[arg(long, value_name = "FILE")]
        store: Option<PathBuf>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s)
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
