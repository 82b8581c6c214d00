// dnsvisor-mobile: UniFFI bindings for the Android and iOS hosts
//
// The host app owns the OS pieces (foreground service, wake lock, network
// callback, the resolver library itself) and hands them in as foreign
// trait objects. Everything stateful runs in dnsvisor-core on the
// library's own tokio runtime.

mod adapters;
mod runtime;

pub use adapters::{
    ForeignConnectivity, ForeignLauncher, ForeignResolver, ForeignWakeLock, LaunchResult,
};

use adapters::{CallbackConnectivity, LauncherAdapter, ResolverAdapter, WakeLockAdapter};
use dnsvisor_core::{
    BootOutcome, FileConfigStore, Health, NetworkCapabilities, NetworkType, RawNetworkEvent,
    ServiceCommand, ServiceConfig, ServiceController, ServiceDeps, ServiceError, ServiceSettings,
    ServiceState, ServiceStatus, SettingsError, SettingsManager, StartOutcome, StopOutcome,
    BOOT_SETTLE_DELAY,
};
use std::sync::Arc;
use tracing::{info, warn};

uniffi::setup_scaffolding!();

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum SupervisorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Supervisor is shut down")]
    ShutDown,
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
    #[error("Settings error: {0}")]
    Settings(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for SupervisorError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidConfig(msg) => Self::InvalidInput(msg),
            ServiceError::InvalidCommand(command) => {
                Self::InvalidInput(format!("unknown command: {command}"))
            }
            ServiceError::ControllerGone => Self::ShutDown,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SettingsError> for SupervisorError {
    fn from(err: SettingsError) -> Self {
        Self::Settings(err.to_string())
    }
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl From<ServiceState> for SupervisorState {
    fn from(state: ServiceState) -> Self {
        match state {
            ServiceState::Stopped => Self::Stopped,
            ServiceState::Starting => Self::Starting,
            ServiceState::Running => Self::Running,
            ServiceState::Stopping => Self::Stopping,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum NetworkKind {
    Unknown,
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

impl From<NetworkType> for NetworkKind {
    fn from(network: NetworkType) -> Self {
        match network {
            NetworkType::Unknown => Self::Unknown,
            NetworkType::Wifi => Self::Wifi,
            NetworkType::Cellular => Self::Cellular,
            NetworkType::Ethernet => Self::Ethernet,
            NetworkType::Other => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum SupervisorHealth {
    Healthy,
    Failed { reason: String },
    /// The UI should point the user at the battery optimisation settings
    BlockedByPlatform { reason: String },
}

impl From<Health> for SupervisorHealth {
    fn from(health: Health) -> Self {
        match health {
            Health::Healthy => Self::Healthy,
            Health::Failed(reason) => Self::Failed { reason },
            Health::BlockedByPlatform(reason) => Self::BlockedByPlatform { reason },
        }
    }
}

/// Capability flags of the network reported by the OS callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct NetworkCaps {
    pub has_internet: bool,
    pub wifi: bool,
    pub cellular: bool,
    pub ethernet: bool,
}

impl From<NetworkCaps> for NetworkCapabilities {
    fn from(caps: NetworkCaps) -> Self {
        Self {
            has_internet: caps.has_internet,
            wifi: caps.wifi,
            cellular: caps.cellular,
            ethernet: caps.ethernet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct ResolverStatsRecord {
    pub blocks: u64,
    pub peers: u64,
    pub queries: u64,
    pub responses: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub stats: Option<ResolverStatsRecord>,
    pub network: NetworkKind,
    pub uptime_secs: Option<u64>,
    pub wake_lock_held: bool,
    pub health: SupervisorHealth,
}

impl From<ServiceStatus> for SupervisorStatus {
    fn from(status: ServiceStatus) -> Self {
        Self {
            state: status.state.into(),
            stats: status.stats.map(|s| ResolverStatsRecord {
                blocks: s.blocks,
                peers: s.peers,
                queries: s.queries,
                responses: s.responses,
            }),
            network: status.network.into(),
            uptime_secs: status.uptime_secs,
            wake_lock_held: status.wake_lock_held,
            health: status.health.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SupervisorConfig {
    /// App-private directory holding the resolver config, data and log
    pub files_dir: String,
    /// DNS listen address; `None` uses the persisted setting
    pub dns_listen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SupervisorSettings {
    pub auto_start: bool,
    pub dns_listen: String,
}

impl From<ServiceSettings> for SupervisorSettings {
    fn from(settings: ServiceSettings) -> Self {
        Self {
            auto_start: settings.auto_start,
            dns_listen: settings.dns_listen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum BootResult {
    Disabled,
    Launched,
    Blocked { reason: String },
    Failed { reason: String },
}

impl From<BootOutcome> for BootResult {
    fn from(outcome: BootOutcome) -> Self {
        match outcome {
            BootOutcome::Disabled => Self::Disabled,
            BootOutcome::Launched => Self::Launched,
            BootOutcome::Blocked(reason) => Self::Blocked { reason },
            BootOutcome::Failed(reason) => Self::Failed { reason },
        }
    }
}

// ============================================================================
// SUPERVISOR OBJECT
// ============================================================================

/// One per host service instance
#[derive(uniffi::Object)]
pub struct ResolverSupervisor {
    controller: ServiceController,
    connectivity: Arc<CallbackConnectivity>,
    runtime: tokio::runtime::Handle,
}

#[uniffi::export]
impl ResolverSupervisor {
    #[uniffi::constructor]
    pub fn new(
        config: SupervisorConfig,
        resolver: Arc<dyn ForeignResolver>,
        wake_lock: Arc<dyn ForeignWakeLock>,
        connectivity: Arc<dyn ForeignConnectivity>,
    ) -> Result<Arc<Self>, SupervisorError> {
        runtime::console();
        let runtime = runtime::global_runtime()?;

        let dns_listen = match config.dns_listen {
            Some(listen) => listen,
            None => SettingsManager::new(&config.files_dir).load().dns_listen,
        };
        let service_config = ServiceConfig::for_files_dir(&config.files_dir, dns_listen.clone());

        let connectivity = Arc::new(CallbackConnectivity::new(connectivity));
        let deps = ServiceDeps {
            resolver: Arc::new(ResolverAdapter(resolver)),
            wake_lock: Arc::new(WakeLockAdapter(wake_lock)),
            connectivity: connectivity.clone(),
            config_store: Arc::new(FileConfigStore::new(dns_listen)),
        };

        let (controller, _task) = {
            let _guard = runtime.enter();
            ServiceController::spawn(service_config, deps)?
        };

        info!("Resolver supervisor created for {}", config.files_dir);
        Ok(Arc::new(Self {
            controller,
            connectivity,
            runtime,
        }))
    }

    /// Request a start; `false` when the current state does not allow one
    pub fn start(&self) -> Result<bool, SupervisorError> {
        let outcome = self.runtime.block_on(self.controller.request_start())?;
        Ok(outcome == StartOutcome::Starting)
    }

    /// Request a stop; `false` when nothing was running
    pub fn stop(&self) -> Result<bool, SupervisorError> {
        let outcome = self.runtime.block_on(self.controller.request_stop())?;
        Ok(!matches!(outcome, StopOutcome::Ignored(_)))
    }

    /// Dispatch a "START" / "STOP" intent action
    pub fn handle_command(&self, command: String) -> Result<(), SupervisorError> {
        let command: ServiceCommand = command.parse()?;
        self.runtime.block_on(self.controller.execute(command))?;
        Ok(())
    }

    pub fn status(&self) -> SupervisorStatus {
        self.runtime.block_on(self.controller.query_status()).into()
    }

    pub fn on_network_available(&self, caps: NetworkCaps) {
        self.connectivity
            .forward(RawNetworkEvent::Available(caps.into()));
    }

    pub fn on_capabilities_changed(&self, caps: NetworkCaps) {
        self.connectivity
            .forward(RawNetworkEvent::CapabilitiesChanged(caps.into()));
    }

    pub fn on_network_lost(&self) {
        self.connectivity.forward(RawNetworkEvent::Lost);
    }

    /// The host could not start its foreground service
    pub fn report_launch_blocked(&self, reason: String) -> Result<(), SupervisorError> {
        self.runtime
            .block_on(self.controller.report_platform_block(reason))?;
        Ok(())
    }

    /// Supervisor log lines followed by the resolver's own recent output
    pub fn console_output(&self) -> String {
        let mut out = runtime::console().render();
        match self.runtime.block_on(self.controller.recent_log()) {
            Ok(native) if !native.is_empty() => {
                out.push_str(&native);
            }
            Ok(_) => {}
            Err(e) => warn!("Resolver log unavailable: {}", e),
        }
        out
    }

    /// Stop the resolver and shut the supervisor down
    pub fn on_destroy(&self) {
        self.runtime.block_on(self.controller.teardown());
    }
}

// ============================================================================
// FREE FUNCTIONS
// ============================================================================

/// Boot receiver entry point. Blocks for the boot settle delay when
/// auto-start is enabled.
#[uniffi::export]
pub fn on_boot_completed(settings_dir: String, launcher: Arc<dyn ForeignLauncher>) -> BootResult {
    runtime::console();
    let settings = SettingsManager::new(&settings_dir).load();

    let runtime = match runtime::global_runtime() {
        Ok(runtime) => runtime,
        Err(e) => return BootResult::Failed { reason: e.to_string() },
    };

    let launcher = LauncherAdapter(launcher);
    runtime
        .block_on(dnsvisor_core::on_boot_completed(
            &settings,
            &launcher,
            BOOT_SETTLE_DELAY,
        ))
        .into()
}

#[uniffi::export]
pub fn load_settings(settings_dir: String) -> SupervisorSettings {
    SettingsManager::new(&settings_dir).load().into()
}

#[uniffi::export]
pub fn save_settings(
    settings_dir: String,
    settings: SupervisorSettings,
) -> Result<(), SupervisorError> {
    SettingsManager::new(&settings_dir).save(&ServiceSettings {
        auto_start: settings.auto_start,
        dns_listen: settings.dns_listen,
    })?;
    Ok(())
}
