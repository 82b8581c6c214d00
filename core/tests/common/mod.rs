// Shared fakes for the controller integration tests
#![allow(dead_code)]

use dnsvisor_core::{
    ConnectivitySink, ConnectivitySource, FileConfigStore, NativeResolver, NetworkCapabilities,
    PlatformError, RawNetworkEvent, ServiceConfig, ServiceController, ServiceDeps, ServiceState,
    ServiceStatus, WakeLock, DEFAULT_DNS_LISTEN,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

// ============================================================================
// FAKE RESOLVER
// ============================================================================

pub struct FakeResolver {
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub reconnect_calls: AtomicUsize,
    start_result: AtomicBool,
    stop_result: AtomicBool,
    running: AtomicBool,
    start_delay: Mutex<Duration>,
    stats_delay: Mutex<Duration>,
    stats_json: Mutex<String>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self {
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
            reconnect_calls: AtomicUsize::new(0),
            start_result: AtomicBool::new(true),
            stop_result: AtomicBool::new(true),
            running: AtomicBool::new(false),
            start_delay: Mutex::new(Duration::ZERO),
            stats_delay: Mutex::new(Duration::ZERO),
            stats_json: Mutex::new(String::from("{}")),
        }
    }

    pub fn fail_start(&self) {
        self.start_result.store(false, Ordering::SeqCst);
    }

    pub fn fail_stop(&self) {
        self.stop_result.store(false, Ordering::SeqCst);
    }

    /// Native start blocks its worker thread for `delay`
    pub fn slow_start(&self, delay: Duration) {
        *self.start_delay.lock() = delay;
    }

    /// Native stats block their worker thread for `delay`
    pub fn slow_stats(&self, delay: Duration) {
        *self.stats_delay.lock() = delay;
    }

    /// The native side dies on its own
    pub fn crash(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn stats_fetches(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn set_stats(&self, json: &str) {
        *self.stats_json.lock() = json.to_string();
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn reconnects(&self) -> usize {
        self.reconnect_calls.load(Ordering::SeqCst)
    }
}

impl NativeResolver for FakeResolver {
    fn start(&self, config_path: &Path, _work_dir: &Path, _log_path: &Path) -> bool {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        assert!(config_path.exists(), "config must exist before native start");

        let delay = *self.start_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let ok = self.start_result.load(Ordering::SeqCst);
        self.running.store(ok, Ordering::SeqCst);
        ok
    }

    fn stop(&self) -> bool {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.stop_result.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stats_json(&self) -> String {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.stats_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.stats_json.lock().clone()
    }

    fn reconnect_network(&self) {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn recent_log(&self) -> String {
        "resolver: listening on [::1]:5353\n".to_string()
    }
}

// ============================================================================
// FAKE PLATFORM
// ============================================================================

#[derive(Default)]
pub struct FakeWakeLock {
    held: AtomicBool,
    pub acquire_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
}

impl FakeWakeLock {
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl WakeLock for FakeWakeLock {
    fn acquire(&self, _max_hold: Duration) -> Result<(), PlatformError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), PlatformError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Stores the sink handed over at registration so tests can play the OS
#[derive(Default)]
pub struct FakeConnectivity {
    sink: Mutex<Option<ConnectivitySink>>,
    pub registrations: AtomicUsize,
}

impl FakeConnectivity {
    pub fn is_registered(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Deliver a raw notification. Returns false when nothing is registered.
    pub fn deliver(&self, event: RawNetworkEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.push(event),
            None => false,
        }
    }
}

impl ConnectivitySource for FakeConnectivity {
    fn register(&self, sink: ConnectivitySink) -> Result<(), PlatformError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn unregister(&self) {
        *self.sink.lock() = None;
    }
}

pub fn wifi() -> NetworkCapabilities {
    NetworkCapabilities {
        has_internet: true,
        wifi: true,
        ..Default::default()
    }
}

pub fn cellular() -> NetworkCapabilities {
    NetworkCapabilities {
        has_internet: true,
        cellular: true,
        ..Default::default()
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub controller: ServiceController,
    pub task: JoinHandle<()>,
    pub resolver: Arc<FakeResolver>,
    pub wake: Arc<FakeWakeLock>,
    pub connectivity: Arc<FakeConnectivity>,
    pub files: TempDir,
}

impl Harness {
    pub fn spawn() -> Self {
        Self::spawn_with(|_| {})
    }

    pub fn spawn_with(tune: impl FnOnce(&mut ServiceConfig)) -> Self {
        let files = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::for_files_dir(files.path(), DEFAULT_DNS_LISTEN);
        tune(&mut config);

        let resolver = Arc::new(FakeResolver::new());
        let wake = Arc::new(FakeWakeLock::default());
        let connectivity = Arc::new(FakeConnectivity::default());

        let deps = ServiceDeps {
            resolver: resolver.clone(),
            wake_lock: wake.clone(),
            connectivity: connectivity.clone(),
            config_store: Arc::new(FileConfigStore::new(DEFAULT_DNS_LISTEN)),
        };

        let (controller, task) = ServiceController::spawn(config, deps).unwrap();
        Self {
            controller,
            task,
            resolver,
            wake,
            connectivity,
            files,
        }
    }

    /// Wait until the published status satisfies `pred`
    pub async fn wait_for(&self, pred: impl FnMut(&ServiceStatus) -> bool) -> ServiceStatus {
        let mut rx = self.controller.subscribe();
        let status = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(pred))
            .await
            .expect("timed out waiting for status")
            .expect("controller gone");
        status.clone()
    }

    pub async fn wait_for_state(&self, state: ServiceState) -> ServiceStatus {
        self.wait_for(|status| status.state == state).await
    }

    pub async fn start_running(&self) {
        self.controller.request_start().await.unwrap();
        self.wait_for_state(ServiceState::Running).await;
    }
}

/// Guard/state agreement at a rest point
pub fn assert_guard_matches(status: &ServiceStatus, wake: &FakeWakeLock) {
    assert_eq!(status.wake_lock_held, wake.is_held());
    match status.state {
        ServiceState::Starting | ServiceState::Running => assert!(wake.is_held()),
        ServiceState::Stopped => assert!(!wake.is_held()),
        ServiceState::Stopping => {}
    }
}
