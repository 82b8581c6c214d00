// Foreign (Kotlin/Swift) implementations of the platform capabilities.
//
// Each foreign trait mirrors one core trait with FFI-friendly types
// (String paths, millisecond timeouts, bool results). The adapters below
// turn them back into the core's typed interfaces.

use dnsvisor_core::{
    ConnectivitySink, ConnectivitySource, NativeResolver, PlatformError, RawNetworkEvent,
    ServiceCommand, ServiceLauncher, WakeLock,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// FOREIGN TRAITS
// ============================================================================

/// The native DNS resolver library as loaded by the host app
#[uniffi::export(with_foreign)]
pub trait ForeignResolver: Send + Sync {
    fn start(&self, config_path: String, work_dir: String, log_path: String) -> bool;
    fn stop(&self) -> bool;
    fn is_running(&self) -> bool;
    fn stats_json(&self) -> String;
    fn reconnect_network(&self);
    fn recent_log(&self) -> String;
}

/// Partial wake lock (Android `PowerManager`, iOS background task)
#[uniffi::export(with_foreign)]
pub trait ForeignWakeLock: Send + Sync {
    /// Acquire or extend the hold; the OS drops it after `timeout_ms`
    fn acquire(&self, timeout_ms: u64) -> bool;
    fn release(&self);
}

/// Registration of the OS network callback. Once registered, the host
/// forwards callbacks to `ResolverSupervisor::on_network_*`.
#[uniffi::export(with_foreign)]
pub trait ForeignConnectivity: Send + Sync {
    fn register_callback(&self) -> bool;
    fn unregister_callback(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum LaunchResult {
    Launched,
    /// Background launch refused (battery optimisation, background restrictions)
    Blocked { reason: String },
    Failed { reason: String },
}

/// Starts the host's foreground service with a START/STOP action
#[uniffi::export(with_foreign)]
pub trait ForeignLauncher: Send + Sync {
    fn launch(&self, command: String) -> LaunchResult;
}

// ============================================================================
// ADAPTERS
// ============================================================================

pub(crate) struct ResolverAdapter(pub Arc<dyn ForeignResolver>);

impl NativeResolver for ResolverAdapter {
    fn start(&self, config_path: &Path, work_dir: &Path, log_path: &Path) -> bool {
        self.0.start(
            config_path.to_string_lossy().into_owned(),
            work_dir.to_string_lossy().into_owned(),
            log_path.to_string_lossy().into_owned(),
        )
    }

    fn stop(&self) -> bool {
        self.0.stop()
    }

    fn is_running(&self) -> bool {
        self.0.is_running()
    }

    fn stats_json(&self) -> String {
        self.0.stats_json()
    }

    fn reconnect_network(&self) {
        self.0.reconnect_network()
    }

    fn recent_log(&self) -> String {
        self.0.recent_log()
    }
}

pub(crate) struct WakeLockAdapter(pub Arc<dyn ForeignWakeLock>);

impl WakeLock for WakeLockAdapter {
    fn acquire(&self, max_hold: Duration) -> Result<(), PlatformError> {
        let timeout_ms = u64::try_from(max_hold.as_millis()).unwrap_or(u64::MAX);
        if self.0.acquire(timeout_ms) {
            Ok(())
        } else {
            Err(PlatformError::Failed("wake lock refused".to_string()))
        }
    }

    fn release(&self) -> Result<(), PlatformError> {
        self.0.release();
        Ok(())
    }
}

/// Holds the sink while the OS callback is registered so the supervisor's
/// `on_network_*` entry points can forward into it
pub(crate) struct CallbackConnectivity {
    foreign: Arc<dyn ForeignConnectivity>,
    sink: Mutex<Option<ConnectivitySink>>,
}

impl CallbackConnectivity {
    pub fn new(foreign: Arc<dyn ForeignConnectivity>) -> Self {
        Self {
            foreign,
            sink: Mutex::new(None),
        }
    }

    /// Forward a callback. Dropped while unregistered.
    pub fn forward(&self, event: RawNetworkEvent) {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                sink.push(event);
            }
            None => debug!("Network callback while unregistered: {:?}", event),
        }
    }
}

impl ConnectivitySource for CallbackConnectivity {
    fn register(&self, sink: ConnectivitySink) -> Result<(), PlatformError> {
        *self.sink.lock() = Some(sink);
        if self.foreign.register_callback() {
            Ok(())
        } else {
            *self.sink.lock() = None;
            Err(PlatformError::Failed(
                "network callback registration refused".to_string(),
            ))
        }
    }

    fn unregister(&self) {
        self.foreign.unregister_callback();
        *self.sink.lock() = None;
    }
}

pub(crate) struct LauncherAdapter(pub Arc<dyn ForeignLauncher>);

impl ServiceLauncher for LauncherAdapter {
    fn launch(&self, command: ServiceCommand) -> Result<(), PlatformError> {
        match self.0.launch(command.as_str().to_string()) {
            LaunchResult::Launched => Ok(()),
            LaunchResult::Blocked { reason } => Err(PlatformError::BackgroundRestricted(reason)),
            LaunchResult::Failed { reason } => Err(PlatformError::Failed(reason)),
        }
    }
}
