// Process-wide runtime and logging for the mobile library.
//
// Platform callbacks arrive on threads the OS owns (main looper, binder
// threads, broadcast receivers); none of them carry a tokio context, so the
// library keeps one multi-threaded runtime alive for the process.

use crate::SupervisorError;
use dnsvisor_core::ConsoleLog;
use std::sync::OnceLock;

static GLOBAL_RT: parking_lot::RwLock<Option<tokio::runtime::Runtime>> =
    parking_lot::RwLock::new(None);

static CONSOLE: OnceLock<ConsoleLog> = OnceLock::new();

/// Handle to the global runtime, creating it on first use
pub(crate) fn global_runtime() -> Result<tokio::runtime::Handle, SupervisorError> {
    let rt_read = GLOBAL_RT.read();
    if let Some(rt) = &*rt_read {
        return Ok(rt.handle().clone());
    }
    drop(rt_read);

    let mut rt_write = GLOBAL_RT.write();
    if let Some(rt) = &*rt_write {
        return Ok(rt.handle().clone());
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("dnsvisor-rt")
        .build()
        .map_err(|e| SupervisorError::Runtime(e.to_string()))?;
    let handle = rt.handle().clone();
    *rt_write = Some(rt);
    tracing::info!("Global Tokio runtime initialized");
    Ok(handle)
}

/// Console buffer shared with the UI. Installs the global subscriber once.
pub(crate) fn console() -> &'static ConsoleLog {
    CONSOLE.get_or_init(|| {
        let console = ConsoleLog::new();
        // Host apps embedding other Rust code may have installed a subscriber already
        if let Err(e) = dnsvisor_core::init_logging("info", console.clone()) {
            eprintln!("dnsvisor: logging already initialized: {e}");
        }
        console
    })
}
