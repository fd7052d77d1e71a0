// Configuration file loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "tunnelmon";
const CONFIG_FILE: &str = "config.json";

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Executable name identifying SSH client processes
    #[serde(default = "default_ssh_name")]
    pub ssh_name: String,

    /// Executable name identifying the supervising auto-reconnect wrapper
    #[serde(default = "default_supervisor_name")]
    pub supervisor_name: String,

    /// Milliseconds between two snapshot rebuilds
    #[serde(default = "default_update_delay_ms")]
    pub update_delay_ms: u64,

    /// Milliseconds between two input polls in the dashboard
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,

    /// Start the dashboard with connection sublines expanded
    #[serde(default)]
    pub show_connections: bool,
}

fn default_ssh_name() -> String {
    "ssh".to_string()
}

fn default_supervisor_name() -> String {
    "autossh".to_string()
}

fn default_update_delay_ms() -> u64 {
    1000
}

fn default_poll_delay_ms() -> u64 {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ssh_name: default_ssh_name(),
            supervisor_name: default_supervisor_name(),
            update_delay_ms: default_update_delay_ms(),
            poll_delay_ms: default_poll_delay_ms(),
            show_connections: false,
        }
    }
}

impl Config {
    /// The default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("no config directory for this user")?;
        Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from disk; `path` overrides the default location.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !resolved.exists() {
            if path.is_some() {
                log::warn!("config file {:?} not found, using defaults", resolved);
            } else {
                log::debug!("config file not found, using defaults");
            }
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&resolved)
            .context(format!("failed to read config file: {:?}", resolved))?;

        let config: Config =
            serde_json::from_str(&contents).context("failed to parse config file")?;

        log::info!("loaded configuration from {:?}", resolved);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.supervisor_name = "myssh-wrapper".to_string();
        config.update_delay_ms = 2000;

        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.supervisor_name, "myssh-wrapper");
        assert_eq!(deserialized.update_delay_ms, 2000);
        assert_eq!(deserialized.ssh_name, "ssh");
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.ssh_name, "ssh");
        assert_eq!(config.supervisor_name, "autossh");
        assert_eq!(config.update_delay_ms, 1000);
        assert_eq!(config.poll_delay_ms, 50);
        assert!(!config.show_connections);
    }
}
