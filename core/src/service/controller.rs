//! Service controller actor
//!
//! One tokio task owns every piece of mutable supervisor state: the
//! lifecycle state, the wake guard, the connectivity monitor, the debounce
//! window and the cached stats. Everything else talks to it by message:
//!
//! - [`ServiceController`] handles send commands with a reply channel
//! - OS connectivity callbacks push raw events through a `ConnectivitySink`
//! - settle timers post `SettledReconnect` when a reconnect is due
//! - blocking native calls run on `spawn_blocking` and report back as
//!   internal messages
//!
//! The actor never blocks on the native resolver except for the bounded
//! stop call, so a slow `start` cannot stall status queries or
//! connectivity handling.

use super::debounce::{ReconnectDebouncer, SettledReconnect};
use super::{
    Health, ServiceCommand, ServiceConfig, ServiceError, ServiceState, ServiceStatus,
    StartOutcome, StopOutcome,
};
use crate::config::ConfigStore;
use crate::platform::connectivity::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivitySink, ConnectivitySource,
    RawNetworkEvent,
};
use crate::platform::wake::{WakeGuard, WakeLock};
use crate::resolver::{NativeResolver, ResolverError, ResolverHandle, ResolverPaths, ResolverStats};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const COMMAND_CAPACITY: usize = 64;

/// Platform collaborators injected into the controller
#[derive(Clone)]
pub struct ServiceDeps {
    pub resolver: Arc<dyn NativeResolver>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub connectivity: Arc<dyn ConnectivitySource>,
    pub config_store: Arc<dyn ConfigStore>,
}

/// Requests accepted by the controller task
#[derive(Debug)]
enum ControlCommand {
    Start {
        reply: mpsc::Sender<StartOutcome>,
    },
    Stop {
        reply: mpsc::Sender<StopOutcome>,
    },
    Status {
        reply: mpsc::Sender<ServiceStatus>,
    },
    RecentLog {
        reply: mpsc::Sender<String>,
    },
    /// The OS refused to launch the service
    PlatformBlocked {
        reason: String,
    },
    /// Stop, then exit the task
    Teardown {
        reply: mpsc::Sender<()>,
    },
}

/// Completions of work the controller dispatched off its own task
#[derive(Debug)]
enum Internal {
    StartFinished(Result<(), ServiceError>),
    StatsFetched(StatsSample),
    /// The stats worker died without reporting
    StatsFailed,
}

/// Result of one native stats round trip
#[derive(Debug, Clone, Copy)]
struct StatsSample {
    /// Start generation the sample was taken in
    run: u64,
    stats: ResolverStats,
    /// Whether the native side still reported itself running
    running: bool,
}

// ============================================================================
// HANDLE
// ============================================================================

/// Handle to the running controller task. Cheap to clone.
///
/// The task exits after [`teardown`](Self::teardown), or once every handle
/// has been dropped; in both cases a running resolver is stopped first.
#[derive(Clone)]
pub struct ServiceController {
    command_tx: mpsc::Sender<ControlCommand>,
    status_rx: watch::Receiver<ServiceStatus>,
    status_timeout: std::time::Duration,
}

impl ServiceController {
    /// Validate `config` and spawn the controller task on the current tokio runtime.
    pub fn spawn(
        config: ServiceConfig,
        deps: ServiceDeps,
    ) -> Result<(Self, JoinHandle<()>), ServiceError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ServiceStatus::default());
        let status_timeout = config.status_timeout;

        let actor = ControllerActor::new(config, deps, command_rx, status_tx);
        let task = tokio::spawn(actor.run());

        info!("Service controller started");
        Ok((
            Self {
                command_tx,
                status_rx,
                status_timeout,
            },
            task,
        ))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(mpsc::Sender<T>) -> ControlCommand,
    ) -> Result<T, ServiceError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ServiceError::ControllerGone)?;

        reply_rx.recv().await.ok_or(ServiceError::ControllerGone)
    }

    /// Request a start. Returns as soon as the controller entered `Starting`.
    pub async fn request_start(&self) -> Result<StartOutcome, ServiceError> {
        self.request(|reply| ControlCommand::Start { reply }).await
    }

    /// Request a stop. While a start is in flight the reply arrives once the
    /// start has completed and the resolver has been stopped again.
    pub async fn request_stop(&self) -> Result<StopOutcome, ServiceError> {
        self.request(|reply| ControlCommand::Stop { reply }).await
    }

    /// Dispatch a caller-facing command
    pub async fn execute(&self, command: ServiceCommand) -> Result<(), ServiceError> {
        match command {
            ServiceCommand::Start => {
                let outcome = self.request_start().await?;
                debug!("START -> {:?}", outcome);
            }
            ServiceCommand::Stop => {
                let outcome = self.request_stop().await?;
                debug!("STOP -> {:?}", outcome);
            }
        }
        Ok(())
    }

    /// Current status, with fresh stats while running.
    ///
    /// Bounded by `status_timeout`; when the controller does not answer in
    /// time the last published status is returned instead.
    pub async fn query_status(&self) -> ServiceStatus {
        let query = self.request(|reply| ControlCommand::Status { reply });
        match tokio::time::timeout(self.status_timeout, query).await {
            Ok(Ok(status)) => status,
            Ok(Err(_)) => self.latest_status(),
            Err(_) => {
                warn!(
                    "Status query timed out after {:?}, using last published status",
                    self.status_timeout
                );
                self.latest_status()
            }
        }
    }

    /// Last status the controller published, without a round trip
    pub fn latest_status(&self) -> ServiceStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch published status changes
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }

    /// Recent console output of the native resolver
    pub async fn recent_log(&self) -> Result<String, ServiceError> {
        self.request(|reply| ControlCommand::RecentLog { reply })
            .await
    }

    /// Record that the OS refused to launch the service
    pub async fn report_platform_block(&self, reason: impl Into<String>) -> Result<(), ServiceError> {
        self.command_tx
            .send(ControlCommand::PlatformBlocked {
                reason: reason.into(),
            })
            .await
            .map_err(|_| ServiceError::ControllerGone)
    }

    /// Stop the resolver if needed and shut the controller task down.
    /// A controller that is already gone counts as torn down.
    pub async fn teardown(&self) {
        match self.request(|reply| ControlCommand::Teardown { reply }).await {
            Ok(()) => {}
            Err(ServiceError::ControllerGone) => debug!("Controller already shut down"),
            Err(e) => warn!("Teardown failed: {}", e),
        }
    }

    /// Blocking variant of [`teardown`](Self::teardown) for synchronous
    /// platform callbacks. Must not be called from within an async context.
    pub fn teardown_blocking(&self) {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        if self
            .command_tx
            .blocking_send(ControlCommand::Teardown { reply: reply_tx })
            .is_err()
        {
            debug!("Controller already shut down");
            return;
        }
        let _ = reply_rx.blocking_recv();
    }
}

// ============================================================================
// ACTOR
// ============================================================================

struct ControllerActor {
    config: ServiceConfig,
    resolver: ResolverHandle,
    config_store: Arc<dyn ConfigStore>,

    state: ServiceState,
    health: Health,
    guard: WakeGuard,
    monitor: ConnectivityMonitor,
    debouncer: ReconnectDebouncer,
    started_at: Option<Instant>,
    cached_stats: Option<ResolverStats>,
    /// Stop requests that arrived while `Starting`
    pending_stops: Vec<mpsc::Sender<StopOutcome>>,
    /// Deadline for the in-flight start once a stop is waiting on it
    start_deadline: Option<Instant>,
    /// A native stats call has not returned yet
    stats_in_flight: bool,
    /// Bumped on every successful start
    run: u64,

    command_rx: mpsc::Receiver<ControlCommand>,
    raw_tx: mpsc::UnboundedSender<RawNetworkEvent>,
    raw_rx: mpsc::UnboundedReceiver<RawNetworkEvent>,
    settled_rx: mpsc::UnboundedReceiver<SettledReconnect>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    status_tx: watch::Sender<ServiceStatus>,
}

impl ControllerActor {
    fn new(
        config: ServiceConfig,
        deps: ServiceDeps,
        command_rx: mpsc::Receiver<ControlCommand>,
        status_tx: watch::Sender<ServiceStatus>,
    ) -> Self {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        Self {
            guard: WakeGuard::new(deps.wake_lock, config.wake_max_hold),
            monitor: ConnectivityMonitor::new(deps.connectivity),
            debouncer: ReconnectDebouncer::new(
                config.min_spacing,
                config.settle_delay,
                settled_tx,
            ),
            resolver: ResolverHandle::new(deps.resolver),
            config_store: deps.config_store,
            config,
            state: ServiceState::Stopped,
            health: Health::Healthy,
            started_at: None,
            cached_stats: None,
            pending_stops: Vec::new(),
            start_deadline: None,
            stats_in_flight: false,
            run: 0,
            command_rx,
            raw_tx,
            raw_rx,
            settled_rx,
            internal_tx,
            internal_rx,
            status_tx,
        }
    }

    async fn run(mut self) {
        let period = self.config.wake_renew_interval;
        let mut renew = tokio::time::interval_at(Instant::now() + period, period);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.publish();

        loop {
            let start_deadline = self.start_deadline;

            tokio::select! {
                biased;

                Some(internal) = self.internal_rx.recv() => {
                    self.handle_internal(internal).await;
                }

                Some(event) = self.raw_rx.recv() => {
                    self.handle_raw_network(event);
                }

                Some(settled) = self.settled_rx.recv() => {
                    self.handle_settled(settled);
                }

                command = self.command_rx.recv() => match command {
                    Some(ControlCommand::Teardown { reply }) => {
                        info!("Teardown requested");
                        self.shutdown().await;
                        let _ = reply.send(()).await;
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("All controller handles dropped, shutting down");
                        self.shutdown().await;
                        break;
                    }
                },

                _ = tokio::time::sleep_until(start_deadline.unwrap_or_else(Instant::now)),
                    if start_deadline.is_some() =>
                {
                    self.abandon_start().await;
                }

                _ = renew.tick() => {
                    self.guard.renew();
                }
            }
        }
    }

    async fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Start { reply } => {
                let outcome = self.start();
                let _ = reply.send(outcome).await;
            }
            ControlCommand::Stop { reply } => match self.state {
                ServiceState::Running => {
                    let outcome = self.stop_now().await;
                    let _ = reply.send(outcome).await;
                }
                ServiceState::Starting => {
                    info!("Stop requested while starting, deferring until start completes");
                    self.pending_stops.push(reply);
                    if self.start_deadline.is_none() {
                        self.start_deadline = Some(Instant::now() + self.config.stop_timeout);
                    }
                }
                state => {
                    debug!("Stop ignored in state {}", state);
                    let _ = reply.send(StopOutcome::Ignored(state)).await;
                }
            },
            ControlCommand::Status { reply } => self.status(reply),
            ControlCommand::RecentLog { reply } => {
                let resolver = self.resolver.clone();
                tokio::spawn(async move {
                    let log = tokio::task::spawn_blocking(move || resolver.recent_log())
                        .await
                        .unwrap_or_default();
                    let _ = reply.send(log).await;
                });
            }
            ControlCommand::PlatformBlocked { reason } => {
                warn!("Service launch blocked by platform: {}", reason);
                self.health = Health::BlockedByPlatform(reason);
                self.publish();
            }
            // Handled by the run loop
            ControlCommand::Teardown { reply } => {
                let _ = reply.send(()).await;
            }
        }
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::StartFinished(result) => self.finish_start(result).await,
            Internal::StatsFailed => self.stats_in_flight = false,
            Internal::StatsFetched(sample) => {
                self.stats_in_flight = false;
                if self.state != ServiceState::Running || sample.run != self.run {
                    return;
                }

                if sample.running {
                    self.cached_stats = Some(sample.stats);
                    self.publish();
                } else {
                    error!("Resolver is no longer running, stopping service");
                    self.stop_now().await;
                    self.health = Health::Failed("resolver exited unexpectedly".to_string());
                    self.publish();
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn start(&mut self) -> StartOutcome {
        if self.state != ServiceState::Stopped {
            debug!("Start ignored in state {}", self.state);
            return StartOutcome::Ignored(self.state);
        }

        self.set_state(ServiceState::Starting);
        self.health = Health::Healthy;

        if let Err(e) = self.guard.acquire() {
            warn!("Starting without wake lock: {}", e);
        }

        let resolver = self.resolver.clone();
        let store = Arc::clone(&self.config_store);
        let paths = self.config.resolver_paths();
        let internal_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || prepare_and_start(&resolver, store.as_ref(), &paths))
                    .await
                    .unwrap_or_else(|e| Err(ResolverError::Worker(e.to_string()).into()));
            let _ = internal_tx.send(Internal::StartFinished(result));
        });

        self.publish();
        StartOutcome::Starting
    }

    async fn finish_start(&mut self, result: Result<(), ServiceError>) {
        if self.state != ServiceState::Starting {
            warn!("Start completion arrived in state {}, ignoring", self.state);
            return;
        }
        self.start_deadline = None;

        match result {
            Ok(()) => {
                self.set_state(ServiceState::Running);
                self.run += 1;
                self.started_at = Some(Instant::now());
                self.cached_stats = None;
                self.debouncer.reset();

                let sink = ConnectivitySink::new(self.raw_tx.clone());
                if let Err(e) = self.monitor.start(sink) {
                    warn!("Connectivity monitoring unavailable: {}", e);
                }
                info!("Resolver running");
            }
            Err(e) => {
                error!("Resolver failed to start: {}", e);
                self.set_state(ServiceState::Stopped);
                self.guard.release();
                self.health = Health::Failed(e.to_string());
            }
        }
        self.publish();

        if self.pending_stops.is_empty() {
            return;
        }

        let outcome = if self.state == ServiceState::Running {
            self.stop_now().await
        } else {
            StopOutcome::Stopped
        };
        for reply in std::mem::take(&mut self.pending_stops) {
            let _ = reply.send(outcome.clone()).await;
        }
    }

    /// Give up on a start that outlived `stop_timeout`: attempt the native
    /// stop anyway, release the guard and answer every waiting stop.
    async fn abandon_start(&mut self) {
        self.start_deadline = None;
        if self.state != ServiceState::Starting {
            return;
        }

        let reason = format!(
            "start did not complete within {:?}",
            self.config.stop_timeout
        );
        error!("Resolver {}, forcing stop", reason);

        self.stop_now().await;
        self.health = Health::Failed(reason.clone());
        self.publish();

        for reply in std::mem::take(&mut self.pending_stops) {
            let _ = reply.send(StopOutcome::Failed(reason.clone())).await;
        }
    }

    async fn stop_now(&mut self) -> StopOutcome {
        self.set_state(ServiceState::Stopping);
        self.publish();

        self.monitor.stop();
        self.debouncer.cancel_pending();

        let resolver = self.resolver.clone();
        let stop_timeout = self.config.stop_timeout;
        let result = match tokio::time::timeout(
            stop_timeout,
            tokio::task::spawn_blocking(move || resolver.stop()),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ResolverError::Worker(e.to_string())),
            Err(_) => Err(ResolverError::TimedOut(stop_timeout)),
        };

        self.set_state(ServiceState::Stopped);
        self.started_at = None;
        self.cached_stats = None;
        self.guard.release();

        let outcome = match result {
            Ok(()) => {
                info!("Resolver stopped");
                StopOutcome::Stopped
            }
            Err(e) => {
                error!("Resolver stop failed: {}", e);
                self.health = Health::Failed(e.to_string());
                StopOutcome::Failed(e.to_string())
            }
        };
        self.publish();
        outcome
    }

    /// Stop path run before the task exits. An in-flight start is awaited first.
    async fn shutdown(&mut self) {
        let deadline = self
            .start_deadline
            .unwrap_or_else(|| Instant::now() + self.config.stop_timeout);

        while self.state == ServiceState::Starting {
            match tokio::time::timeout_at(deadline, self.internal_rx.recv()).await {
                Ok(Some(internal)) => self.handle_internal(internal).await,
                Ok(None) => break,
                Err(_) => self.abandon_start().await,
            }
        }

        if self.state == ServiceState::Running {
            self.stop_now().await;
        }

        self.monitor.stop();
        self.debouncer.cancel_pending();
        self.guard.release();
        self.publish();
        info!("Service controller shut down");
    }

    // ------------------------------------------------------------------------
    // Connectivity
    // ------------------------------------------------------------------------

    fn handle_raw_network(&mut self, raw: RawNetworkEvent) {
        let now = Instant::now();
        let Some(event) = self.monitor.observe(raw, now) else {
            return;
        };

        match event {
            ConnectivityEvent::Changed(network) => {
                if self.state == ServiceState::Running {
                    self.debouncer.notify(network, now);
                }
            }
            ConnectivityEvent::Lost => {
                debug!("Waiting for connectivity to return");
            }
        }
        self.publish();
    }

    fn handle_settled(&mut self, settled: SettledReconnect) {
        if self.state != ServiceState::Running {
            debug!("Dropping settled reconnect in state {}", self.state);
            return;
        }

        info!(
            "Network settled on {}, signalling resolver to reconnect",
            settled.network
        );
        let resolver = self.resolver.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = resolver.reconnect() {
                warn!("Reconnect signal failed: {}", e);
            }
        });
    }

    // ------------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------------

    fn status(&mut self, reply: mpsc::Sender<ServiceStatus>) {
        let mut status = self.snapshot();
        if self.state != ServiceState::Running {
            let _ = reply.try_send(status);
            return;
        }

        // At most one native stats call at a time; a hung one must not pile up workers
        if self.stats_in_flight {
            debug!("Stats fetch still in flight, reporting cached snapshot");
            let _ = reply.try_send(status);
            return;
        }
        self.stats_in_flight = true;

        let resolver = self.resolver.clone();
        let stats_timeout = self.config.stats_timeout;
        let internal_tx = self.internal_tx.clone();
        let run = self.run;

        // The worker reports completion itself so the flag clears even after a timeout
        let worker = tokio::task::spawn_blocking(move || {
            let sample = StatsSample {
                run,
                stats: resolver.stats(),
                running: resolver.is_running(),
            };
            let _ = internal_tx.send(Internal::StatsFetched(sample));
            sample
        });
        let failed_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            match tokio::time::timeout(stats_timeout, worker).await {
                Ok(Ok(sample)) => status.stats = Some(sample.stats),
                Ok(Err(e)) => {
                    warn!("Stats worker failed: {}", e);
                    let _ = failed_tx.send(Internal::StatsFailed);
                }
                Err(_) => warn!(
                    "Stats fetch timed out after {:?}, reporting cached snapshot",
                    stats_timeout
                ),
            }
            let _ = reply.send(status).await;
        });
    }

    fn snapshot(&self) -> ServiceStatus {
        let running = self.state == ServiceState::Running;
        ServiceStatus {
            state: self.state,
            stats: if running {
                Some(self.cached_stats.unwrap_or_default())
            } else {
                None
            },
            network: self.monitor.current(),
            uptime_secs: self
                .started_at
                .filter(|_| running)
                .map(|at| at.elapsed().as_secs()),
            wake_lock_held: self.guard.is_held(),
            health: self.health.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    fn set_state(&mut self, next: ServiceState) {
        if self.state != next {
            info!("Service state: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

/// Blocking start sequence: make sure a configuration and working directory
/// exist, then hand off to the native resolver.
fn prepare_and_start(
    resolver: &ResolverHandle,
    store: &dyn ConfigStore,
    paths: &ResolverPaths,
) -> Result<(), ServiceError> {
    store
        .ensure_default_config(&paths.config_path)
        .map_err(|e| ServiceError::Config(e.to_string()))?;
    std::fs::create_dir_all(&paths.work_dir).map_err(|e| {
        ServiceError::Config(format!(
            "cannot create {}: {}",
            paths.work_dir.display(),
            e
        ))
    })?;

    resolver.start(paths)?;
    Ok(())
}
