// src/config/validate.rs

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    ConfigFile, RawConfigFile, RawShellSection, RawUpdatesSection, UpdateSettings, WatchSettings,
};
use crate::errors::{PhpmonError, Result};
use crate::exec::ShellConfig;
use crate::updates::SchedulePolicy;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PhpmonError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let shell = validate_shell(raw.shell)?;

        let debounce = parse_setting("[watch].debounce", &raw.watch.debounce)?;
        let watch = WatchSettings {
            debounce: (!debounce.is_zero()).then_some(debounce),
        };

        let updates = validate_updates(raw.updates)?;

        Ok(ConfigFile {
            shell,
            watch,
            updates,
        })
    }
}

fn validate_shell(raw: RawShellSection) -> Result<ShellConfig> {
    if raw.program.trim().is_empty() {
        return Err(PhpmonError::ConfigError(
            "[shell].program must not be empty".to_string(),
        ));
    }

    let default_timeout = match raw.default_timeout.as_deref() {
        Some(s) => {
            let timeout = parse_setting("[shell].default_timeout", s)?;
            if timeout.is_zero() {
                return Err(PhpmonError::ConfigError(
                    "[shell].default_timeout must be greater than zero".to_string(),
                ));
            }
            Some(timeout)
        }
        None => None,
    };

    Ok(ShellConfig {
        program: raw.program,
        login: raw.login,
        path_prefix: raw.path_prefix,
        env: raw.env,
        default_timeout,
    })
}

fn validate_updates(raw: RawUpdatesSection) -> Result<UpdateSettings> {
    let normal_interval = parse_setting("[updates].normal_interval", &raw.normal_interval)?;
    let minimum_interval = parse_setting("[updates].minimum_interval", &raw.minimum_interval)?;

    if normal_interval.is_zero() {
        return Err(PhpmonError::ConfigError(
            "[updates].normal_interval must be greater than zero".to_string(),
        ));
    }
    if minimum_interval > normal_interval {
        return Err(PhpmonError::ConfigError(format!(
            "[updates].minimum_interval ({}) must not exceed normal_interval ({})",
            raw.minimum_interval, raw.normal_interval
        )));
    }

    let retry_delays = raw
        .retry_delays
        .iter()
        .enumerate()
        .map(|(i, s)| parse_setting(&format!("[updates].retry_delays[{i}]"), s))
        .collect::<Result<Vec<_>>>()?;

    if let Some(cmd) = &raw.check_command {
        if cmd.trim().is_empty() {
            return Err(PhpmonError::ConfigError(
                "[updates].check_command must not be empty when set".to_string(),
            ));
        }
    }

    Ok(UpdateSettings {
        enabled: raw.enabled,
        policy: SchedulePolicy {
            normal_interval,
            minimum_interval,
            retry_delays,
        },
        check_command: raw.check_command,
        store_path: raw.store_path.as_deref().map(expand_home).transpose()?,
    })
}

/// Replace a leading `~` component with the user's home directory.
/// `~user` forms are left as written.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let home = dirs::home_dir().ok_or_else(|| {
                PhpmonError::ConfigError(format!(
                    "[updates].store_path: cannot expand '~' in {} without a home directory",
                    path.display()
                ))
            })?;
            Ok(home.join(components.as_path()))
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn parse_setting(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| PhpmonError::ConfigError(format!("{name}: {e}")))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
