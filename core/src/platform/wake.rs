//! Wake-lock guard
//!
//! Holding the platform wake lock keeps the device from suspending the
//! resolver's threads. The guard tracks a single `held` flag so that
//! acquire and release are both idempotent, whatever path the supervisor
//! takes out of a start or stop.

use super::PlatformError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum hold passed to the platform on every (re)acquire.
///
/// The platform drops the lock on its own once this elapses, so the
/// supervisor renews it well before expiry while the resolver runs.
pub const DEFAULT_MAX_HOLD: Duration = Duration::from_secs(10 * 60);

/// Platform wake-lock primitive (Android `PowerManager.WakeLock`, iOS
/// background task assertion, no-op on desktop)
#[cfg_attr(test, mockall::automock)]
pub trait WakeLock: Send + Sync {
    /// Acquire, or extend an existing hold, for at most `max_hold`
    fn acquire(&self, max_hold: Duration) -> Result<(), PlatformError>;
    /// Release the lock
    fn release(&self) -> Result<(), PlatformError>;
}

/// Idempotent owner of a [`WakeLock`]
pub struct WakeGuard {
    lock: Arc<dyn WakeLock>,
    max_hold: Duration,
    held: bool,
}

impl WakeGuard {
    pub fn new(lock: Arc<dyn WakeLock>, max_hold: Duration) -> Self {
        Self {
            lock,
            max_hold,
            held: false,
        }
    }

    /// Acquire the lock. No-op while already held.
    pub fn acquire(&mut self) -> Result<(), PlatformError> {
        if self.held {
            return Ok(());
        }

        self.lock.acquire(self.max_hold)?;
        self.held = true;
        debug!("Wake lock acquired (max hold {:?})", self.max_hold);
        Ok(())
    }

    /// Extend the hold so the platform timeout does not fire under a running service
    pub fn renew(&mut self) {
        if !self.held {
            return;
        }

        match self.lock.acquire(self.max_hold) {
            Ok(()) => debug!("Wake lock renewed"),
            Err(e) => warn!("Failed to renew wake lock: {}", e),
        }
    }

    /// Release the lock. No-op while not held.
    ///
    /// The guard is considered released even if the platform reports an
    /// error; retrying a release is never useful.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }

        self.held = false;
        match self.lock.release() {
            Ok(()) => debug!("Wake lock released"),
            Err(e) => warn!("Wake lock release reported an error: {}", e),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        self.release();
    }
}
