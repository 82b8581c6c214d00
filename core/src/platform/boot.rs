//! Boot-time auto-start
//!
//! After the device finishes booting the host calls [`on_boot_completed`]
//! with the persisted settings. When auto-start is enabled the START command
//! is issued through the platform's service launcher after a short settle
//! delay. Launch failures are logged and reported, never propagated: the
//! boot receiver must not crash.

use super::settings::ServiceSettings;
use super::PlatformError;
use crate::service::ServiceCommand;
use std::time::Duration;
use tracing::{error, info, warn};

/// Wait after boot before launching, letting the system finish bringing up services
pub const BOOT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Starts the supervisor service through the platform (an Android
/// foreground-service intent, a launchd/systemd job on desktop)
#[cfg_attr(test, mockall::automock)]
pub trait ServiceLauncher: Send + Sync {
    fn launch(&self, command: ServiceCommand) -> Result<(), PlatformError>;
}

/// Result of a boot notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// Auto-start is off
    Disabled,
    Launched,
    /// The OS refused to launch the service in the background
    Blocked(String),
    Failed(String),
}

/// Apply the auto-start policy after boot
pub async fn on_boot_completed(
    settings: &ServiceSettings,
    launcher: &dyn ServiceLauncher,
    delay: Duration,
) -> BootOutcome {
    if !settings.auto_start {
        info!("Boot completed, auto-start disabled");
        return BootOutcome::Disabled;
    }

    info!("Boot completed, auto-starting in {:?}", delay);
    tokio::time::sleep(delay).await;

    match launcher.launch(ServiceCommand::Start) {
        Ok(()) => {
            info!("Resolver service launched after boot");
            BootOutcome::Launched
        }
        Err(PlatformError::BackgroundRestricted(reason)) => {
            warn!("Auto-start blocked by platform: {}", reason);
            BootOutcome::Blocked(reason)
        }
        Err(e) => {
            error!("Auto-start failed: {}", e);
            BootOutcome::Failed(e.to_string())
        }
    }
}
