// dnsvisor core: resolver supervisor
//
// Keeps a long-running native DNS resolver alive on devices that sleep,
// lose their network and switch between WiFi and cellular:
// - lifecycle state machine with a wake-lock guard (service)
// - connectivity change detection and debounced reconnects (platform, service)
// - resolver configuration and persisted settings (config, platform::settings)
//
// The resolver itself stays opaque behind `resolver::NativeResolver`.

pub mod config;
pub mod logging;
pub mod platform;
pub mod resolver;
pub mod service;

pub use config::{ConfigError, ConfigStore, FileConfigStore, DEFAULT_DNS_LISTEN};
pub use logging::{init_logging, ConsoleLog, CONSOLE_CAPACITY};
pub use platform::{
    on_boot_completed, BootOutcome, ConnectivityEvent, ConnectivityMonitor, ConnectivitySink,
    ConnectivitySource, NetworkCapabilities, NetworkType, PlatformError, RawNetworkEvent,
    ServiceLauncher, ServiceSettings, SettingsError, SettingsManager, WakeGuard, WakeLock,
    BOOT_SETTLE_DELAY, DEFAULT_MAX_HOLD,
};
pub use resolver::{NativeResolver, ResolverError, ResolverHandle, ResolverPaths, ResolverStats};
pub use service::{
    Health, ServiceCommand, ServiceConfig, ServiceController, ServiceDeps, ServiceError,
    ServiceState, ServiceStatus, StartOutcome, StopOutcome,
};
