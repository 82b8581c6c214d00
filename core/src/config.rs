//! Resolver configuration file collaborator
//!
//! The supervisor never interprets the resolver's configuration. It only
//! makes sure a file exists before the first start, generating a default
//! tuned for mobile devices when the user has not written one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Default DNS listen address: loopback IPv6 on a non-privileged port
pub const DEFAULT_DNS_LISTEN: &str = "[::1]:5353";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Storage for the resolver's configuration text
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    /// Create the configuration with defaults if it does not exist yet
    fn ensure_default_config(&self, path: &Path) -> Result<(), ConfigError>;
    /// Current configuration text, `None` when absent
    fn load_config(&self, path: &Path) -> Result<Option<String>, ConfigError>;
    /// Replace the configuration text
    fn save_config(&self, path: &Path, text: &str) -> Result<(), ConfigError>;
}

/// Plain file-backed [`ConfigStore`]
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dns_listen: String,
}

impl FileConfigStore {
    /// `dns_listen` is substituted into generated defaults
    pub fn new(dns_listen: impl Into<String>) -> Self {
        Self {
            dns_listen: dns_listen.into(),
        }
    }

    /// The text written by [`ConfigStore::ensure_default_config`]
    pub fn default_config(&self) -> String {
        DEFAULT_CONFIG_TEMPLATE.replace("{dns_listen}", &self.dns_listen)
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_LISTEN)
    }
}

impl ConfigStore for FileConfigStore {
    fn ensure_default_config(&self, path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }

        self.save_config(path, &self.default_config())?;
        info!("Default configuration generated at {}", path.display());
        Ok(())
    }

    fn load_config(&self, path: &Path) -> Result<Option<String>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn save_config(&self, path: &Path, text: &str) -> Result<(), ConfigError> {
        let write_err = |source: io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, text).map_err(write_err)
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Resolver configuration generated for mobile devices
# The hash of first block in a chain to know with which nodes to work
origin = "0000001D2A77D63477172678502E51DE7F346061FF7EB188A2445ECA3FC0780E"
# No key files on mobile
key_files = []
# Reduced block checking for mobile
check_blocks = 4

[net]
peers = ["peer-v4.alfis.name:4244", "peer-v6.alfis.name:4244"]
listen = "127.0.0.1:42440"
# Mobile devices are never public peers
public = false
yggdrasil_only = true

[dns]
listen = "{dns_listen}"
threads = 8
# DoH first, plain DNS as fallback
forwarders = ["https://dns.adguard.com/dns-query", "8.8.8.8:53"]
bootstraps = ["8.8.8.8:53", "1.1.1.1:53"]

[mining]
threads = 0
lower = true
"#;
