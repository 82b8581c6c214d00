// Resolver run as a child process
//
// On desktop the resolver is a separate executable. It is started with
// `-c <config>` inside the working directory, its output appended to the
// log file. Stats are read from `<work_dir>/stats.json`, which the resolver
// rewrites periodically; SIGHUP asks it to re-establish peer connections.

use dnsvisor_core::{NativeResolver, CONSOLE_CAPACITY};
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a fresh child must survive to count as started
const STARTUP_GRACE: Duration = Duration::from_millis(300);

pub const STATS_FILE: &str = "stats.json";

struct Running {
    child: Child,
    work_dir: PathBuf,
    log_path: PathBuf,
}

pub struct ProcessResolver {
    binary: PathBuf,
    running: Mutex<Option<Running>>,
    /// Kept after stop so the log stays readable
    last_log: Mutex<Option<PathBuf>>,
}

impl ProcessResolver {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            running: Mutex::new(None),
            last_log: Mutex::new(None),
        }
    }

    fn spawn(&self, config_path: &Path, work_dir: &Path, log_path: &Path) -> std::io::Result<Child> {
        let log = File::options().create(true).append(true).open(log_path)?;
        let log_err = log.try_clone()?;

        Command::new(&self.binary)
            .arg("-c")
            .arg(config_path)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .spawn()
    }
}

impl NativeResolver for ProcessResolver {
    fn start(&self, config_path: &Path, work_dir: &Path, log_path: &Path) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Resolver process already running");
            return true;
        }

        let mut child = match self.spawn(config_path, work_dir, log_path) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn {}: {}", self.binary.display(), e);
                return false;
            }
        };

        std::thread::sleep(STARTUP_GRACE);
        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                error!("Resolver exited during startup: {}", status);
                return false;
            }
            Err(e) => {
                error!("Cannot query resolver process: {}", e);
                let _ = child.kill();
                return false;
            }
        }

        info!("Resolver process started (pid {})", child.id());
        *self.last_log.lock() = Some(log_path.to_path_buf());
        *running = Some(Running {
            child,
            work_dir: work_dir.to_path_buf(),
            log_path: log_path.to_path_buf(),
        });
        true
    }

    fn stop(&self) -> bool {
        let Some(mut running) = self.running.lock().take() else {
            debug!("Stop with no resolver process");
            return true;
        };

        if let Err(e) = running.child.kill() {
            // Already exited
            debug!("Kill failed: {}", e);
        }
        match running.child.wait() {
            Ok(status) => {
                info!("Resolver process exited: {}", status);
                true
            }
            Err(e) => {
                error!("Failed to reap resolver process: {}", e);
                false
            }
        }
    }

    fn is_running(&self) -> bool {
        match self.running.lock().as_mut() {
            Some(running) => matches!(running.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn stats_json(&self) -> String {
        let Some(work_dir) = self
            .running
            .lock()
            .as_ref()
            .map(|running| running.work_dir.clone())
        else {
            return String::new();
        };

        std::fs::read_to_string(work_dir.join(STATS_FILE)).unwrap_or_default()
    }

    fn reconnect_network(&self) {
        let running = self.running.lock();
        let Some(running) = running.as_ref() else {
            return;
        };
        signal_reconnect(running.child.id());
    }

    fn recent_log(&self) -> String {
        let path = match self.running.lock().as_ref() {
            Some(running) => Some(running.log_path.clone()),
            None => self.last_log.lock().clone(),
        };
        path.map(|path| tail_file(&path, CONSOLE_CAPACITY))
            .unwrap_or_default()
    }
}

impl Drop for ProcessResolver {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.get_mut().take() {
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}

#[cfg(unix)]
fn signal_reconnect(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        warn!("Resolver pid {} out of range", pid);
        return;
    };
    // SAFETY: kill(2) with a pid we spawned and still own; no memory is shared
    let rc = unsafe { libc::kill(pid, libc::SIGHUP) };
    if rc == 0 {
        debug!("Sent SIGHUP to resolver (pid {})", pid);
    } else {
        warn!(
            "SIGHUP to resolver failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn signal_reconnect(pid: u32) {
    debug!("Reconnect signal unsupported on this platform (pid {})", pid);
}

/// Last `max_lines` lines of a text file, empty when unreadable
fn tail_file(path: &Path, max_lines: usize) -> String {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return String::new();
    };

    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    let mut out = lines[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
