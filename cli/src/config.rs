// Configuration management for the dnsvisor CLI
//
// Cross-platform locations:
// - config: ~/.config/dnsvisor/ (cli.json, settings.json)
// - data:   ~/.local/share/dnsvisor/ (resolver.toml, resolver.log, chain data)
//
// cli.json holds desktop-only knobs; settings.json is the same document the
// mobile apps persist (auto_start, dns_listen).

use anyhow::{Context, Result};
use dnsvisor_core::{ServiceSettings, SettingsManager};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CLI_CONFIG_FILE: &str = "cli.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resolver executable supervised by `run`
    pub resolver_bin: Option<String>,

    /// Directory for the resolver's config, data and log (defaults to the data dir)
    pub files_dir: Option<String>,

    /// Seconds between status lines printed by `run`
    pub status_interval_secs: u64,

    /// Seconds between network interface scans
    pub netwatch_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver_bin: None,
            files_dir: None,
            status_interval_secs: 30,
            netwatch_interval_secs: 2,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("dnsvisor");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("dnsvisor");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    /// Load `cli.json` from `dir`, defaults when absent
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config_file = dir.join(CLI_CONFIG_FILE);

        if !config_file.exists() {
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_file).context("Failed to read config file")?;
        let config: Self =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        anyhow::ensure!(
            config.netwatch_interval_secs > 0,
            "netwatch_interval_secs in {} must be positive",
            config_file.display()
        );
        Ok(config)
    }

    pub fn save_to(&self, dir: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(dir.join(CLI_CONFIG_FILE), contents)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Resolver files directory, falling back to the data directory
    pub fn files_dir(&self) -> Result<PathBuf> {
        match &self.files_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Self::data_dir(),
        }
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "resolver_bin" => {
                self.resolver_bin = (!value.is_empty()).then(|| value.to_string());
            }
            "files_dir" => {
                self.files_dir = (!value.is_empty()).then(|| value.to_string());
            }
            "status_interval_secs" => {
                self.status_interval_secs = value.parse().context("Invalid number")?;
            }
            "netwatch_interval_secs" => {
                let secs: u64 = value.parse().context("Invalid number")?;
                anyhow::ensure!(secs > 0, "netwatch_interval_secs must be positive");
                self.netwatch_interval_secs = secs;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            (
                "resolver_bin".to_string(),
                self.resolver_bin
                    .clone()
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
            (
                "files_dir".to_string(),
                self.files_dir.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            (
                "status_interval_secs".to_string(),
                self.status_interval_secs.to_string(),
            ),
            (
                "netwatch_interval_secs".to_string(),
                self.netwatch_interval_secs.to_string(),
            ),
        ]
    }
}

/// Apply `key = value` to the persisted service settings in `dir`
pub fn set_service_setting(dir: &Path, key: &str, value: &str) -> Result<ServiceSettings> {
    let manager = SettingsManager::new(dir);
    let parsed_bool = value.parse::<bool>();

    let updated = match key {
        "auto_start" => {
            let enabled = parsed_bool.context("Invalid boolean value")?;
            manager.update(|settings| settings.auto_start = enabled)?
        }
        "dns_listen" => manager.update(|settings| settings.dns_listen = value.to_string())?,
        _ => anyhow::bail!("Unknown setting: {}", key),
    };
    Ok(updated)
}

/// Whether `key` names a service setting rather than a CLI config value
pub fn is_service_setting(key: &str) -> bool {
    matches!(key, "auto_start" | "dns_listen")
}
