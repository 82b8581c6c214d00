//! Connectivity classification and change detection
//!
//! The OS delivers network callbacks on its own threads, often re-delivering
//! identical capability sets several times per second. Adapters only push
//! the raw notification into a [`ConnectivitySink`]; classification and
//! change detection happen in [`ConnectivityMonitor`] on the supervisor's
//! task, which turns the storm into one event per real transition.

use super::PlatformError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Transport class of the active network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    #[default]
    Unknown,
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Wifi => write!(f, "WiFi"),
            Self::Cellular => write!(f, "Cellular"),
            Self::Ethernet => write!(f, "Ethernet"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Capability flags as reported by the OS for a network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    /// General internet capability
    pub has_internet: bool,
    pub wifi: bool,
    pub cellular: bool,
    pub ethernet: bool,
}

impl NetworkCapabilities {
    /// Classify by fixed priority Wifi > Cellular > Ethernet > Other.
    ///
    /// Networks without internet capability are not classified.
    pub fn classify(&self) -> Option<NetworkType> {
        if !self.has_internet {
            return None;
        }

        let network_type = if self.wifi {
            NetworkType::Wifi
        } else if self.cellular {
            NetworkType::Cellular
        } else if self.ethernet {
            NetworkType::Ethernet
        } else {
            NetworkType::Other
        };
        Some(network_type)
    }
}

/// Raw OS notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawNetworkEvent {
    Available(NetworkCapabilities),
    CapabilitiesChanged(NetworkCapabilities),
    Lost,
}

/// Most recent classified observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityObservation {
    pub network_type: NetworkType,
    pub has_internet: bool,
    pub observed_at: Instant,
}

/// Logical connectivity event emitted by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The classified network type differs from the previous one
    Changed(NetworkType),
    /// Connectivity went away
    Lost,
}

/// Thread-safe entry point for OS callbacks.
///
/// Pushing never blocks and never touches supervisor state; the event is
/// queued for the supervisor task.
#[derive(Debug, Clone)]
pub struct ConnectivitySink {
    tx: mpsc::UnboundedSender<RawNetworkEvent>,
}

impl ConnectivitySink {
    pub fn new(tx: mpsc::UnboundedSender<RawNetworkEvent>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end, for hosts driving a monitor by hand
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RawNetworkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a raw notification. Returns `false` once the supervisor is gone.
    pub fn push(&self, event: RawNetworkEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Registration with the OS notification source
#[cfg_attr(test, mockall::automock)]
pub trait ConnectivitySource: Send + Sync {
    /// Start delivering notifications for networks with internet capability into `sink`
    fn register(&self, sink: ConnectivitySink) -> Result<(), PlatformError>;
    /// Stop delivering notifications
    fn unregister(&self);
}

/// Change detector over raw OS notifications
pub struct ConnectivityMonitor {
    source: Arc<dyn ConnectivitySource>,
    registered: bool,
    last_observed: NetworkType,
    last_observation: Option<ConnectivityObservation>,
    lost: bool,
}

impl ConnectivityMonitor {
    pub fn new(source: Arc<dyn ConnectivitySource>) -> Self {
        Self {
            source,
            registered: false,
            last_observed: NetworkType::Unknown,
            last_observation: None,
            lost: false,
        }
    }

    /// Register with the OS. Change detection starts over from `Unknown`.
    pub fn start(&mut self, sink: ConnectivitySink) -> Result<(), PlatformError> {
        if self.registered {
            return Ok(());
        }

        self.last_observed = NetworkType::Unknown;
        self.last_observation = None;
        self.lost = false;

        self.source.register(sink)?;
        self.registered = true;
        info!("Connectivity monitoring started");
        Ok(())
    }

    /// Unregister. Safe when never started and when called twice.
    pub fn stop(&mut self) {
        if !self.registered {
            return;
        }

        self.source.unregister();
        self.registered = false;
        info!("Connectivity monitoring stopped");
    }

    pub fn is_active(&self) -> bool {
        self.registered
    }

    /// Network type the supervisor should report
    pub fn current(&self) -> NetworkType {
        if self.lost {
            NetworkType::Unknown
        } else {
            self.last_observed
        }
    }

    pub fn last_observation(&self) -> Option<ConnectivityObservation> {
        self.last_observation
    }

    /// Feed one raw notification; returns the logical event it produces, if any.
    ///
    /// Notifications arriving after [`stop`](Self::stop) are ignored.
    pub fn observe(&mut self, event: RawNetworkEvent, now: Instant) -> Option<ConnectivityEvent> {
        if !self.registered {
            debug!("Dropping {:?}, monitor not active", event);
            return None;
        }

        match event {
            RawNetworkEvent::Lost => {
                self.last_observation = Some(ConnectivityObservation {
                    network_type: NetworkType::Unknown,
                    has_internet: false,
                    observed_at: now,
                });

                if self.lost {
                    return None;
                }
                self.lost = true;
                info!("Connectivity lost (last network: {})", self.last_observed);
                Some(ConnectivityEvent::Lost)
            }
            RawNetworkEvent::Available(caps) | RawNetworkEvent::CapabilitiesChanged(caps) => {
                let Some(network_type) = caps.classify() else {
                    debug!("Ignoring network without internet capability");
                    return None;
                };

                self.lost = false;
                self.last_observation = Some(ConnectivityObservation {
                    network_type,
                    has_internet: true,
                    observed_at: now,
                });

                if network_type == self.last_observed {
                    return None;
                }

                info!("Network changed: {} -> {}", self.last_observed, network_type);
                self.last_observed = network_type;
                Some(ConnectivityEvent::Changed(network_type))
            }
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
