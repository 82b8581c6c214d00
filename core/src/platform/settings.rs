//! Persisted service settings
//!
//! Two user-facing values survive restarts:
//! - `auto_start`: launch the resolver after the device boots
//! - `dns_listen`: address the resolver's DNS server binds to
//!
//! Both are plain input to the supervisor; they are read when a start is
//! requested and never consulted afterwards.

use crate::config::DEFAULT_DNS_LISTEN;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// File name of the settings document inside the settings directory
pub const SETTINGS_FILE: &str = "settings.json";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsError {
    #[error("Invalid DNS listen address: {0}")]
    InvalidListenAddress(String),

    #[error("Settings storage error: {0}")]
    Storage(String),

    #[error("Settings serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// SERVICE SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Issue START once the device has finished booting
    pub auto_start: bool,
    /// Socket address for the resolver's DNS listener
    pub dns_listen: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            auto_start: false,
            dns_listen: DEFAULT_DNS_LISTEN.to_string(),
        }
    }
}

impl ServiceSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.dns_listen
            .parse::<SocketAddr>()
            .map(|_| ())
            .map_err(|_| SettingsError::InvalidListenAddress(self.dns_listen.clone()))
    }
}

// ============================================================================
// SETTINGS MANAGER
// ============================================================================

/// Loads and saves [`ServiceSettings`] as JSON
pub struct SettingsManager {
    path: PathBuf,
}

impl SettingsManager {
    /// Manager for `<dir>/settings.json`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing or unreadable document yields defaults
    pub fn load(&self) -> ServiceSettings {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ServiceSettings::default();
            }
            Err(e) => {
                warn!("Failed to read {}: {}, using defaults", self.path.display(), e);
                return ServiceSettings::default();
            }
        };

        match serde_json::from_str::<ServiceSettings>(&contents) {
            Ok(settings) if settings.validate().is_ok() => settings,
            Ok(settings) => {
                warn!(
                    "Stored DNS listen address {:?} is invalid, using default",
                    settings.dns_listen
                );
                ServiceSettings {
                    dns_listen: DEFAULT_DNS_LISTEN.to_string(),
                    ..settings
                }
            }
            Err(e) => {
                warn!("Corrupt settings file {}: {}, using defaults", self.path.display(), e);
                ServiceSettings::default()
            }
        }
    }

    /// Validate and persist
    pub fn save(&self, settings: &ServiceSettings) -> Result<(), SettingsError> {
        settings.validate()?;

        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| SettingsError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Storage(e.to_string()))?;
        }
        std::fs::write(&self.path, json).map_err(|e| SettingsError::Storage(e.to_string()))
    }

    /// Load, apply `change`, save
    pub fn update(
        &self,
        change: impl FnOnce(&mut ServiceSettings),
    ) -> Result<ServiceSettings, SettingsError> {
        let mut settings = self.load();
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = ServiceSettings::default();
        assert!(!settings.auto_start);
        assert_eq!(settings.dns_listen, "[::1]:5353");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_listen_rejected() {
        let settings = ServiceSettings {
            dns_listen: "localhost:53".into(),
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidListenAddress("localhost:53".into()))
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path());
        assert_eq!(manager.load(), ServiceSettings::default());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path());
        std::fs::write(manager.path(), r#"{"auto_start": true}"#).unwrap();

        let settings = manager.load();
        assert!(settings.auto_start);
        assert_eq!(settings.dns_listen, DEFAULT_DNS_LISTEN);
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path());
        std::fs::write(manager.path(), "{ auto_start").unwrap();

        assert_eq!(manager.load(), ServiceSettings::default());
    }

    #[test]
    fn test_invalid_stored_listen_is_replaced() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path());
        std::fs::write(
            manager.path(),
            r#"{"auto_start": true, "dns_listen": "nonsense"}"#,
        )
        .unwrap();

        let settings = manager.load();
        assert!(settings.auto_start);
        assert_eq!(settings.dns_listen, DEFAULT_DNS_LISTEN);
    }

    #[test]
    fn test_save_rejects_invalid() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path());
        let settings = ServiceSettings {
            dns_listen: "::1".into(),
            ..Default::default()
        };

        assert!(manager.save(&settings).is_err());
        assert!(!manager.path().exists());
    }
}
