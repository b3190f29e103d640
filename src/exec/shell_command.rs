// src/exec/shell_command.rs

//! How a command string becomes an OS process invocation.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::Duration;

/// Settings for the shell that interprets every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Shell binary, e.g. `/bin/sh` or `/bin/zsh`.
    pub program: String,
    /// Start the shell as a login shell (`-l`) so profile-defined PATH
    /// entries and aliases are the same as in a terminal.
    pub login: bool,
    /// Directories prepended to `PATH`, in order.
    pub path_prefix: Vec<String>,
    /// Extra environment variables exported into every command.
    pub env: BTreeMap<String, String>,
    /// Timeout applied to `sync`/`pipe` when the command carries none.
    pub default_timeout: Option<Duration>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell_program().to_string(),
            login: cfg!(unix),
            path_prefix: Vec::new(),
            env: BTreeMap::new(),
            default_timeout: None,
        }
    }
}

impl ShellConfig {
    /// A non-login shell with no environment changes.
    ///
    /// Useful where profile scripts would add noise or latency.
    pub fn plain() -> Self {
        Self {
            login: false,
            ..Self::default()
        }
    }

    /// Arguments passed to `program` to run `text`.
    pub fn args(&self, text: &str) -> Vec<String> {
        if cfg!(windows) {
            return vec!["/C".to_string(), text.to_string()];
        }

        let mut args = Vec::with_capacity(3);
        if self.login {
            args.push("-l".to_string());
        }
        args.push("-c".to_string());
        args.push(text.to_string());
        args
    }

    /// Environment overrides for a spawned command, `PATH` included.
    pub fn envs(&self) -> Vec<(OsString, OsString)> {
        let mut envs: Vec<(OsString, OsString)> = self
            .env
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect();

        if let Some(path) = self.prefixed_path() {
            envs.push((OsString::from("PATH"), path));
        }

        envs
    }

    fn prefixed_path(&self) -> Option<OsString> {
        if self.path_prefix.is_empty() {
            return None;
        }

        let existing = std::env::var_os("PATH").unwrap_or_default();
        let entries = self
            .path_prefix
            .iter()
            .map(std::path::PathBuf::from)
            .chain(std::env::split_paths(&existing));

        std::env::join_paths(entries).ok()
    }

    /// Build a blocking `std::process::Command`.
    pub fn std_command(&self, text: &str) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(self.args(text)).envs(self.envs());
        cmd
    }

    /// Build an async `tokio::process::Command`.
    pub fn tokio_command(&self, text: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.args(text)).envs(self.envs());
        cmd
    }
}

fn default_shell_program() -> &'static str {
    if cfg!(windows) { "cmd" } else { "/bin/sh" }
}
