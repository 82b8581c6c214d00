//! Boundary to the native DNS resolver
//!
//! The resolver itself (DNS server, blockchain, P2P network) is an opaque
//! component. This module defines the narrow call interface the supervisor
//! consumes, plus [`ResolverHandle`], the adapter that turns the raw
//! boolean/JSON contract into typed results and keeps panics raised on the
//! native side from unwinding into the supervisor.

mod stats;

pub use stats::ResolverStats;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors raised while driving the native resolver
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Native resolver refused to start")]
    StartRejected,
    #[error("Native resolver reported a failed stop")]
    StopRejected,
    #[error("Native call panicked: {0}")]
    Panicked(String),
    #[error("Native call did not return within {0:?}")]
    TimedOut(Duration),
    #[error("Native worker failed: {0}")]
    Worker(String),
}

/// Call interface exposed by the native resolver.
///
/// Every method may block; callers dispatch them off their own control
/// thread. `start` in particular may take arbitrary time.
#[cfg_attr(test, mockall::automock)]
pub trait NativeResolver: Send + Sync {
    /// Start the resolver with its configuration file, working directory and log file
    fn start(&self, config_path: &Path, work_dir: &Path, log_path: &Path) -> bool;
    /// Stop the resolver, releasing its sockets
    fn stop(&self) -> bool;
    /// Whether the native side considers itself running
    fn is_running(&self) -> bool;
    /// Statistics snapshot as a JSON object, see [`ResolverStats`]
    fn stats_json(&self) -> String;
    /// Ask the network layer to drop stale connections and reconnect
    fn reconnect_network(&self);
    /// Best-effort recent console output
    fn recent_log(&self) -> String;
}

/// File locations handed to the native resolver on start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverPaths {
    pub config_path: PathBuf,
    pub work_dir: PathBuf,
    pub log_path: PathBuf,
}

/// Typed, panic-contained wrapper around a [`NativeResolver`]
#[derive(Clone)]
pub struct ResolverHandle {
    inner: Arc<dyn NativeResolver>,
}

impl ResolverHandle {
    pub fn new(inner: Arc<dyn NativeResolver>) -> Self {
        Self { inner }
    }

    /// Start the resolver. `false` from the native side becomes
    /// [`ResolverError::StartRejected`].
    pub fn start(&self, paths: &ResolverPaths) -> Result<(), ResolverError> {
        debug!(
            "Native start: config={} work_dir={} log={}",
            paths.config_path.display(),
            paths.work_dir.display(),
            paths.log_path.display()
        );

        let started = contain("start", || {
            self.inner
                .start(&paths.config_path, &paths.work_dir, &paths.log_path)
        })?;

        if started {
            Ok(())
        } else {
            Err(ResolverError::StartRejected)
        }
    }

    /// Stop the resolver
    pub fn stop(&self) -> Result<(), ResolverError> {
        if contain("stop", || self.inner.stop())? {
            Ok(())
        } else {
            Err(ResolverError::StopRejected)
        }
    }

    /// Running flag; a panicking native side is reported as not running
    pub fn is_running(&self) -> bool {
        contain("is_running", || self.inner.is_running()).unwrap_or(false)
    }

    /// Current statistics, zeroed when the snapshot is malformed or the call panics
    pub fn stats(&self) -> ResolverStats {
        match contain("stats", || self.inner.stats_json()) {
            Ok(raw) => ResolverStats::parse(&raw),
            Err(_) => ResolverStats::default(),
        }
    }

    /// Fire the reconnect signal
    pub fn reconnect(&self) -> Result<(), ResolverError> {
        contain("reconnect_network", || self.inner.reconnect_network())
    }

    /// Recent native console output, empty when unavailable
    pub fn recent_log(&self) -> String {
        contain("recent_log", || self.inner.recent_log()).unwrap_or_default()
    }
}

/// Run a native call, converting a panic into [`ResolverError::Panicked`].
fn contain<T>(op: &str, call: impl FnOnce() -> T) -> Result<T, ResolverError> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        error!("Native {} panicked: {}", op, message);
        ResolverError::Panicked(message)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else {
        warn!("Native panic carried a non-string payload");
        "unknown panic".to_string()
    }
}
