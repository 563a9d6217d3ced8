//! Engine configuration read from `SYNCDECK_*` environment variables.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::{normalize_text_option, parse_flag};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings shared by every front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// Explicit daemon executable; discovered when unset
    pub mutagen_bin: Option<PathBuf>,
    pub ssh_config_path: PathBuf,
    pub command_timeout: Duration,
    pub create_timeout: Duration,
    pub preseed_timeout: Duration,
    pub poll_interval: Duration,
    /// Start the daemon once when a listing finds it stopped
    pub autostart_daemon: bool,
    /// Best-effort `ssh-add` of connection keys
    pub ssh_agent: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            mutagen_bin: None,
            ssh_config_path: default_ssh_config_path(),
            command_timeout: Duration::from_secs(60),
            create_timeout: Duration::from_secs(120),
            preseed_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(3),
            autostart_daemon: true,
            ssh_agent: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = optional_trimmed(&lookup, "SYNCDECK_DB_PATH")
            .map_or(defaults.db_path, PathBuf::from);
        let mutagen_bin = optional_trimmed(&lookup, "SYNCDECK_MUTAGEN_BIN").map(PathBuf::from);
        let ssh_config_path = optional_trimmed(&lookup, "SYNCDECK_SSH_CONFIG")
            .map_or(defaults.ssh_config_path, PathBuf::from);

        let command_timeout = seconds_in_range(&lookup, "SYNCDECK_COMMAND_TIMEOUT_SECS", 60, 5, 600)?;
        let create_timeout = seconds_in_range(&lookup, "SYNCDECK_CREATE_TIMEOUT_SECS", 120, 5, 1_800)?;
        let preseed_timeout =
            seconds_in_range(&lookup, "SYNCDECK_PRESEED_TIMEOUT_SECS", 300, 10, 7_200)?;
        let poll_interval = seconds_in_range(&lookup, "SYNCDECK_POLL_INTERVAL_SECS", 3, 1, 3_600)?;

        let autostart_daemon =
            optional_trimmed(&lookup, "SYNCDECK_AUTOSTART_DAEMON").map_or(true, |v| parse_flag(&v));
        let ssh_agent =
            optional_trimmed(&lookup, "SYNCDECK_SSH_AGENT").map_or(true, |v| parse_flag(&v));

        Ok(Self {
            db_path,
            mutagen_bin,
            ssh_config_path,
            command_timeout,
            create_timeout,
            preseed_timeout,
            poll_interval,
            autostart_daemon,
            ssh_agent,
        })
    }
}

/// `<data dir>/syncdeck/syncdeck.db`, or a relative fallback.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("syncdeck")
        .join("syncdeck.db")
}

pub fn default_ssh_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("config")
}

fn seconds_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(Duration::from_secs(default));
    };
    let seconds = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]"))
    })?;
    if !(min..=max).contains(&seconds) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(Duration::from_secs(seconds))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
