// Linux connectivity source backed by procfs/sysfs polling
//
// Desktop Linux has no single network callback API the CLI can rely on, so
// the default route is sampled periodically. Interfaces carrying a default
// route are classified by their sysfs entry and reported as raw
// notifications; the core's monitor does the change detection.

use dnsvisor_core::{ConnectivitySink, ConnectivitySource, NetworkCapabilities, PlatformError, RawNetworkEvent};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const ROUTE_TABLE: &str = "/proc/net/route";
const SYS_CLASS_NET: &str = "/sys/class/net";

/// Interface name prefixes used by modem drivers
const CELLULAR_PREFIXES: &[&str] = &["wwan", "rmnet", "ccmni", "ppp"];

/// ARPHRD_ETHER
const ARPHRD_ETHER: &str = "1";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Route flag: route is up
const RTF_UP: u32 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

/// Interfaces holding an active default route, in table order
pub fn parse_default_routes(route_table: &str) -> Vec<String> {
    let mut ifaces = Vec::new();

    // Columns: Iface Destination Gateway Flags RefCnt Use Metric Mask ...
    for line in route_table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        let is_default = fields[1] == "00000000";
        let is_up = u32::from_str_radix(fields[3], 16)
            .map(|flags| flags & RTF_UP != 0)
            .unwrap_or(false);

        if is_default && is_up && !ifaces.iter().any(|iface| iface == fields[0]) {
            ifaces.push(fields[0].to_string());
        }
    }
    ifaces
}

/// Classify an interface by its sysfs entry under `sys_root`
pub fn classify_interface(sys_root: &Path, iface: &str) -> InterfaceKind {
    let entry = sys_root.join(iface);

    if entry.join("wireless").exists() || entry.join("phy80211").exists() {
        return InterfaceKind::Wifi;
    }
    if CELLULAR_PREFIXES.iter().any(|prefix| iface.starts_with(prefix)) {
        return InterfaceKind::Cellular;
    }

    match std::fs::read_to_string(entry.join("type")) {
        Ok(kind) if kind.trim() == ARPHRD_ETHER => InterfaceKind::Ethernet,
        _ => InterfaceKind::Other,
    }
}

/// Capabilities of the current uplink set; `None` without a default route
pub fn capabilities(sys_root: &Path, default_ifaces: &[String]) -> Option<NetworkCapabilities> {
    if default_ifaces.is_empty() {
        return None;
    }

    let mut caps = NetworkCapabilities {
        has_internet: true,
        ..Default::default()
    };
    for iface in default_ifaces {
        match classify_interface(sys_root, iface) {
            InterfaceKind::Wifi => caps.wifi = true,
            InterfaceKind::Cellular => caps.cellular = true,
            InterfaceKind::Ethernet => caps.ethernet = true,
            InterfaceKind::Other => {}
        }
    }
    Some(caps)
}

/// Polling [`ConnectivitySource`]
pub struct SysfsConnectivity {
    route_table: PathBuf,
    sys_root: PathBuf,
    interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SysfsConnectivity {
    pub fn new(interval: Duration) -> Self {
        Self::with_paths(ROUTE_TABLE, SYS_CLASS_NET, interval)
    }

    pub fn with_paths(
        route_table: impl Into<PathBuf>,
        sys_root: impl Into<PathBuf>,
        interval: Duration,
    ) -> Self {
        Self {
            route_table: route_table.into(),
            sys_root: sys_root.into(),
            interval,
            poller: Mutex::new(None),
        }
    }
}

impl ConnectivitySource for SysfsConnectivity {
    fn register(&self, sink: ConnectivitySink) -> Result<(), PlatformError> {
        if !self.route_table.exists() {
            return Err(PlatformError::Unsupported(format!(
                "{} not available",
                self.route_table.display()
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlatformError::Failed(format!("no runtime for network poller: {e}")))?;

        let route_table = self.route_table.clone();
        let sys_root = self.sys_root.clone();
        // tokio intervals panic on a zero period
        let interval = self.interval.max(MIN_POLL_INTERVAL);

        let poller = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last: Option<Option<NetworkCapabilities>> = None;

            loop {
                ticker.tick().await;

                let table = tokio::fs::read_to_string(&route_table)
                    .await
                    .unwrap_or_default();
                let current = capabilities(&sys_root, &parse_default_routes(&table));
                if last == Some(current) {
                    continue;
                }
                last = Some(current);

                let event = match current {
                    Some(caps) => RawNetworkEvent::CapabilitiesChanged(caps),
                    None => RawNetworkEvent::Lost,
                };
                debug!("Network scan: {:?}", event);
                if !sink.push(event) {
                    break;
                }
            }
        });

        if let Some(previous) = self.poller.lock().replace(poller) {
            previous.abort();
        }
        info!("Polling network state every {:?}", self.interval);
        Ok(())
    }

    fn unregister(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.abort();
        }
    }
}

impl Drop for SysfsConnectivity {
    fn drop(&mut self) {
        self.unregister();
    }
}
