// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::ShellConfig;
use crate::updates::SchedulePolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [shell]
/// program = "/bin/zsh"
/// path_prefix = ["/opt/homebrew/bin"]
/// default_timeout = "30s"
///
/// [watch]
/// debounce = "300ms"
///
/// [updates]
/// retry_delays = ["5m", "15m", "1h"]
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are
/// strings with a unit suffix (`ms`, `s`, `m`, `h`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub shell: RawShellSection,

    #[serde(default)]
    pub watch: RawWatchSection,

    #[serde(default)]
    pub updates: RawUpdatesSection,
}

/// `[shell]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawShellSection {
    #[serde(default = "default_shell_program")]
    pub program: String,

    #[serde(default = "default_true")]
    pub login: bool,

    #[serde(default)]
    pub path_prefix: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub default_timeout: Option<String>,
}

impl Default for RawShellSection {
    fn default() -> Self {
        Self {
            program: default_shell_program(),
            login: true,
            path_prefix: Vec::new(),
            env: BTreeMap::new(),
            default_timeout: None,
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWatchSection {
    /// Debounce window for file notifiers; `"0ms"` disables debouncing.
    #[serde(default = "default_debounce")]
    pub debounce: String,
}

impl Default for RawWatchSection {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
        }
    }
}

/// `[updates]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUpdatesSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_normal_interval")]
    pub normal_interval: String,

    #[serde(default = "default_minimum_interval")]
    pub minimum_interval: String,

    #[serde(default = "default_retry_delays")]
    pub retry_delays: Vec<String>,

    /// Command whose stdout contains the latest version.
    #[serde(default)]
    pub check_command: Option<String>,

    /// File backing the scheduler's durable fields; in-memory if unset.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Default for RawUpdatesSection {
    fn default() -> Self {
        Self {
            enabled: true,
            normal_interval: default_normal_interval(),
            minimum_interval: default_minimum_interval(),
            retry_delays: default_retry_delays(),
            check_command: None,
            store_path: None,
        }
    }
}

fn default_shell_program() -> String {
    ShellConfig::default().program
}

fn default_true() -> bool {
    true
}

fn default_debounce() -> String {
    "300ms".to_string()
}

fn default_normal_interval() -> String {
    "24h".to_string()
}

fn default_minimum_interval() -> String {
    "1h".to_string()
}

fn default_retry_delays() -> Vec<String> {
    ["5m", "15m", "1h", "3h"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Validated configuration with durations parsed.
///
/// Only constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub shell: ShellConfig,
    pub watch: WatchSettings,
    pub updates: UpdateSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// `None` means every matching OS event is delivered.
    pub debounce: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSettings {
    pub enabled: bool,
    pub policy: SchedulePolicy,
    pub check_command: Option<String>,
    pub store_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        // The raw defaults are known-good.
        ConfigFile::try_from(RawConfigFile::default()).unwrap_or_else(|_| ConfigFile {
            shell: ShellConfig::default(),
            watch: WatchSettings {
                debounce: Some(Duration::from_millis(300)),
            },
            updates: UpdateSettings {
                enabled: true,
                policy: SchedulePolicy::default(),
                check_command: None,
                store_path: None,
            },
        })
    }
}
