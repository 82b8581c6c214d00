//! Reconnect debouncing
//!
//! A connectivity change is accepted at most once per `min_spacing`; each
//! accepted change fires a single reconnect after `settle_delay`, giving
//! the new network time to finish DHCP and DNS setup.

use crate::platform::connectivity::NetworkType;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_MIN_SPACING: Duration = Duration::from_secs(5);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Rate limiter over accepted connectivity changes
#[derive(Debug, Clone)]
pub struct DebounceWindow {
    last_accepted_at: Option<Instant>,
    min_spacing: Duration,
}

impl DebounceWindow {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            last_accepted_at: None,
            min_spacing,
        }
    }

    /// Accept `now` unless it falls within `min_spacing` of the last accepted
    /// change. A dropped change leaves the window where it was.
    pub fn try_accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted_at {
            if now.saturating_duration_since(last) < self.min_spacing {
                return false;
            }
        }
        self.last_accepted_at = Some(now);
        true
    }

    pub fn last_accepted_at(&self) -> Option<Instant> {
        self.last_accepted_at
    }

    pub fn reset(&mut self) {
        self.last_accepted_at = None;
    }
}

/// Posted back to the controller once the settle delay of an accepted change elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettledReconnect {
    pub network: NetworkType,
    pub accepted_at: Instant,
}

/// Debounce window plus settle timers.
///
/// Timers run as detached tokio tasks and report through `settled_tx`, so
/// the owner never sleeps.
pub struct ReconnectDebouncer {
    window: DebounceWindow,
    settle_delay: Duration,
    settled_tx: mpsc::UnboundedSender<SettledReconnect>,
    pending: Vec<JoinHandle<()>>,
}

impl ReconnectDebouncer {
    pub fn new(
        min_spacing: Duration,
        settle_delay: Duration,
        settled_tx: mpsc::UnboundedSender<SettledReconnect>,
    ) -> Self {
        Self {
            window: DebounceWindow::new(min_spacing),
            settle_delay,
            settled_tx,
            pending: Vec::new(),
        }
    }

    /// Feed a connectivity change. Returns whether it was accepted.
    pub fn notify(&mut self, network: NetworkType, now: Instant) -> bool {
        if !self.window.try_accept(now) {
            debug!("Debounced network change to {}", network);
            return false;
        }

        self.pending.retain(|handle| !handle.is_finished());

        let tx = self.settled_tx.clone();
        let delay = self.settle_delay;
        let settled = SettledReconnect {
            network,
            accepted_at: now,
        };
        self.pending.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the controller is shutting down
            let _ = tx.send(settled);
        }));

        debug!("Network change to {} accepted, reconnect in {:?}", network, delay);
        true
    }

    /// Abort settle timers that have not fired yet
    pub fn cancel_pending(&mut self) {
        for handle in self.pending.drain(..) {
            handle.abort();
        }
    }

    /// Forget the acceptance history and drop pending timers
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.window.reset();
    }

    pub fn last_accepted_at(&self) -> Option<Instant> {
        self.window.last_accepted_at()
    }
}

impl Drop for ReconnectDebouncer {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_drops_without_moving() {
        let mut window = DebounceWindow::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert!(window.try_accept(t0));
        assert!(!window.try_accept(t0 + Duration::from_secs(2)));
        assert!(!window.try_accept(t0 + Duration::from_secs(4)));
        // 5s after the first acceptance, not after the last drop
        assert!(window.try_accept(t0 + Duration::from_secs(5)));
        assert_eq!(window.last_accepted_at(), Some(t0 + Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_spacing_accepts_everything() {
        let mut window = DebounceWindow::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(window.try_accept(t0));
        assert!(window.try_accept(t0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_at_0_2_7_fire_twice() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = ReconnectDebouncer::new(DEFAULT_MIN_SPACING, DEFAULT_SETTLE_DELAY, tx);
        let t0 = Instant::now();

        assert!(debouncer.notify(NetworkType::Wifi, Instant::now()));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!debouncer.notify(NetworkType::Cellular, Instant::now()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(debouncer.notify(NetworkType::Wifi, Instant::now()));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.network, NetworkType::Wifi);
        assert_eq!(first.accepted_at, t0);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.accepted_at, t0 + Duration::from_secs(7));
        assert!(Instant::now() >= t0 + Duration::from_secs(8));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_elapses_before_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = ReconnectDebouncer::new(DEFAULT_MIN_SPACING, DEFAULT_SETTLE_DELAY, tx);

        debouncer.notify(NetworkType::Cellular, Instant::now());
        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(rx.recv().await.unwrap().network, NetworkType::Cellular);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending_suppresses_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = ReconnectDebouncer::new(DEFAULT_MIN_SPACING, DEFAULT_SETTLE_DELAY, tx);

        debouncer.notify(NetworkType::Wifi, Instant::now());
        debouncer.cancel_pending();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_reopens_window() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut debouncer = ReconnectDebouncer::new(DEFAULT_MIN_SPACING, DEFAULT_SETTLE_DELAY, tx);
        let now = Instant::now();

        assert!(debouncer.notify(NetworkType::Wifi, now));
        debouncer.reset();
        assert_eq!(debouncer.last_accepted_at(), None);
        assert!(debouncer.notify(NetworkType::Wifi, now));
    }
}
