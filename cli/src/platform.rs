// Desktop stand-ins for the mobile platform capabilities

use dnsvisor_core::{PlatformError, ServiceCommand, ServiceLauncher, WakeLock};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// Desktop hosts do not suspend a running service; the lock is only logged
#[derive(Debug, Default)]
pub struct LoggingWakeLock;

impl WakeLock for LoggingWakeLock {
    fn acquire(&self, max_hold: Duration) -> Result<(), PlatformError> {
        debug!("Wake lock held (max {:?})", max_hold);
        Ok(())
    }

    fn release(&self) -> Result<(), PlatformError> {
        debug!("Wake lock released");
        Ok(())
    }
}

/// Launches `dnsvisor run` as a detached process
pub struct SelfLauncher {
    exe: PathBuf,
    extra_args: Vec<String>,
}

impl SelfLauncher {
    pub fn current(extra_args: Vec<String>) -> Result<Self, PlatformError> {
        let exe = std::env::current_exe()
            .map_err(|e| PlatformError::Failed(format!("cannot locate executable: {e}")))?;
        Ok(Self { exe, extra_args })
    }
}

impl ServiceLauncher for SelfLauncher {
    fn launch(&self, command: ServiceCommand) -> Result<(), PlatformError> {
        match command {
            ServiceCommand::Start => {
                let child = Command::new(&self.exe)
                    .args(&self.extra_args)
                    .arg("run")
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| PlatformError::Failed(e.to_string()))?;
                debug!("Launched supervisor process (pid {})", child.id());
                Ok(())
            }
            ServiceCommand::Stop => Err(PlatformError::Unsupported(
                "stop a detached supervisor with Ctrl-C or its service manager".to_string(),
            )),
        }
    }
}
