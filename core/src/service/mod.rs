//! Service lifecycle and connectivity-recovery controller
//!
//! Platform code (Android service, iOS background task, desktop CLI) creates
//! a [`ServiceController`], forwards START/STOP requests to it and polls
//! [`ServiceController::query_status`] for display. All state lives on one
//! tokio task; see [`controller`] for the message flow.

pub mod controller;
pub mod debounce;

pub use controller::{ServiceController, ServiceDeps};
pub use debounce::{DebounceWindow, ReconnectDebouncer, SettledReconnect};

use crate::config::DEFAULT_DNS_LISTEN;
use crate::platform::connectivity::NetworkType;
use crate::platform::wake::DEFAULT_MAX_HOLD;
use crate::platform::PlatformError;
use crate::resolver::{ResolverError, ResolverPaths, ResolverStats};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Resolver configuration file name inside the files directory
pub const CONFIG_FILE_NAME: &str = "resolver.toml";
/// Resolver log file name inside the files directory
pub const LOG_FILE_NAME: &str = "resolver.log";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown service command: {0}")]
    InvalidCommand(String),

    #[error("Resolver configuration unavailable: {0}")]
    Config(String),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Service controller is no longer running")]
    ControllerGone,
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServiceState {
    /// States in which the native resolver may be started and the wake lock is held
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

/// User-visible health next to the state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    #[default]
    Healthy,
    /// The last start or stop failed
    Failed(String),
    /// The OS refused to run the service in the background
    BlockedByPlatform(String),
}

/// Snapshot returned by [`ServiceController::query_status`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// Present only while running
    pub stats: Option<ResolverStats>,
    pub network: NetworkType,
    /// Seconds since the resolver came up, while running
    pub uptime_secs: Option<u64>,
    pub wake_lock_held: bool,
    pub health: Health,
}

/// Caller-facing lifecycle commands, delivered through the platform's
/// service start mechanism (intent actions on Android)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCommand {
    Start,
    Stop,
}

impl ServiceCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}

impl std::fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceCommand {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "START" => Ok(Self::Start),
            "STOP" => Ok(Self::Stop),
            _ => Err(ServiceError::InvalidCommand(s.trim().to_string())),
        }
    }
}

/// Reply to a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Accepted; the native start runs in the background
    Starting,
    /// Rejected by the state check
    Ignored(ServiceState),
}

/// Reply to a stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Rejected by the state check
    Ignored(ServiceState),
    /// Stopped, but the native stop reported a failure
    Failed(String),
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub config_path: PathBuf,
    pub work_dir: PathBuf,
    pub log_path: PathBuf,
    /// Minimum spacing between accepted connectivity changes
    pub min_spacing: Duration,
    /// Delay between an accepted change and the reconnect signal
    pub settle_delay: Duration,
    /// Upper bound on the native stop call
    pub stop_timeout: Duration,
    /// Upper bound on the native stats call
    pub stats_timeout: Duration,
    /// Upper bound on a status round trip through the controller
    pub status_timeout: Duration,
    /// Platform timeout passed with every wake-lock acquire
    pub wake_max_hold: Duration,
    /// How often the wake lock is renewed while held
    pub wake_renew_interval: Duration,
    /// DNS listen address written into a freshly generated resolver configuration
    pub dns_listen: String,
}

impl ServiceConfig {
    /// Conventional layout: configuration, log and working data all in `files_dir`
    pub fn for_files_dir(files_dir: impl AsRef<Path>, dns_listen: impl Into<String>) -> Self {
        let files_dir = files_dir.as_ref();
        Self {
            config_path: files_dir.join(CONFIG_FILE_NAME),
            work_dir: files_dir.to_path_buf(),
            log_path: files_dir.join(LOG_FILE_NAME),
            dns_listen: dns_listen.into(),
            ..Self::default()
        }
    }

    pub fn resolver_paths(&self) -> ResolverPaths {
        ResolverPaths {
            config_path: self.config_path.clone(),
            work_dir: self.work_dir.clone(),
            log_path: self.log_path.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        for (name, path) in [
            ("config_path", &self.config_path),
            ("work_dir", &self.work_dir),
            ("log_path", &self.log_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ServiceError::InvalidConfig(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        for (name, value) in [
            ("settle_delay", self.settle_delay),
            ("stop_timeout", self.stop_timeout),
            ("stats_timeout", self.stats_timeout),
            ("status_timeout", self.status_timeout),
            ("wake_max_hold", self.wake_max_hold),
            ("wake_renew_interval", self.wake_renew_interval),
        ] {
            if value.is_zero() {
                return Err(ServiceError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.dns_listen.parse::<SocketAddr>().is_err() {
            return Err(ServiceError::InvalidConfig(format!(
                "invalid dns_listen address: {}",
                self.dns_listen
            )));
        }

        if self.wake_renew_interval >= self.wake_max_hold {
            return Err(ServiceError::InvalidConfig(
                "wake_renew_interval must be shorter than wake_max_hold".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            work_dir: PathBuf::new(),
            log_path: PathBuf::new(),
            min_spacing: debounce::DEFAULT_MIN_SPACING,
            settle_delay: debounce::DEFAULT_SETTLE_DELAY,
            stop_timeout: Duration::from_secs(10),
            stats_timeout: Duration::from_secs(2),
            status_timeout: Duration::from_secs(3),
            wake_max_hold: DEFAULT_MAX_HOLD,
            wake_renew_interval: DEFAULT_MAX_HOLD / 2,
            dns_listen: DEFAULT_DNS_LISTEN.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_dir_layout() {
        let config = ServiceConfig::for_files_dir("/data/user/0/app/files", DEFAULT_DNS_LISTEN);
        assert_eq!(
            config.config_path,
            PathBuf::from("/data/user/0/app/files/resolver.toml")
        );
        assert_eq!(config.work_dir, PathBuf::from("/data/user/0/app/files"));
        assert_eq!(
            config.log_path,
            PathBuf::from("/data/user/0/app/files/resolver.log")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_timing() {
        let config = ServiceConfig::default();
        assert_eq!(config.min_spacing, Duration::from_secs(5));
        assert_eq!(config.settle_delay, Duration::from_secs(1));
        assert!(config.status_timeout > config.stats_timeout);
    }

    #[test]
    fn test_empty_paths_rejected() {
        assert!(ServiceConfig::default().validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServiceConfig {
            stop_timeout: Duration::ZERO,
            ..ServiceConfig::for_files_dir("/tmp/dnsvisor", DEFAULT_DNS_LISTEN)
        };
        assert!(matches!(
            config.validate(),
            Err(ServiceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_renew_must_beat_max_hold() {
        let config = ServiceConfig {
            wake_renew_interval: Duration::from_secs(600),
            wake_max_hold: Duration::from_secs(600),
            ..ServiceConfig::for_files_dir("/tmp/dnsvisor", DEFAULT_DNS_LISTEN)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_listen_rejected() {
        let config = ServiceConfig::for_files_dir("/tmp/dnsvisor", "localhost");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_active_states() {
        assert!(!ServiceState::Stopped.is_active());
        assert!(ServiceState::Starting.is_active());
        assert!(ServiceState::Running.is_active());
        assert!(!ServiceState::Stopping.is_active());
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!("START".parse::<ServiceCommand>().unwrap(), ServiceCommand::Start);
        assert_eq!(" stop ".parse::<ServiceCommand>().unwrap(), ServiceCommand::Stop);
        assert_eq!(
            "RESTART".parse::<ServiceCommand>(),
            Err(ServiceError::InvalidCommand("RESTART".to_string()))
        );
        assert_eq!(ServiceCommand::Start.to_string(), "START");
    }
}
