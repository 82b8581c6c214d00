//! Platform integration layer for mobile (Android/iOS) and desktop hosts
//!
//! This module provides:
//! - The wake-lock guard that keeps the resolver scheduled
//! - Connectivity classification and change detection over OS callbacks
//! - The boot-time auto-start entry point
//! - Persisted service settings (auto-start flag, DNS listen address)
//!
//! Everything the OS owns is reached through a small trait so hosts can
//! plug in their own implementation and tests can substitute fakes.

pub mod boot;
pub mod connectivity;
pub mod settings;
pub mod wake;

pub use boot::{on_boot_completed, BootOutcome, ServiceLauncher, BOOT_SETTLE_DELAY};
pub use connectivity::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityObservation, ConnectivitySink,
    ConnectivitySource, NetworkCapabilities, NetworkType, RawNetworkEvent,
};
pub use settings::{ServiceSettings, SettingsError, SettingsManager};
pub use wake::{WakeGuard, WakeLock, DEFAULT_MAX_HOLD};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by platform adapters
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformError {
    /// The OS refused background execution (battery optimisation, app standby, ...)
    #[error("Blocked by platform: {0}")]
    BackgroundRestricted(String),

    #[error("Unsupported operation on this platform: {0}")]
    Unsupported(String),

    #[error("Platform call failed: {0}")]
    Failed(String),
}
