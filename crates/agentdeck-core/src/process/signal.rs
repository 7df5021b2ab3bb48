//! Platform "ask nicely" termination

use tracing::debug;

/// Send SIGTERM to the process
#[cfg(unix)]
pub(crate) fn request_terminate(pid: u32) {
    // SAFETY: kill(2) has no memory-safety preconditions; a stale pid yields ESRCH
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        debug!("Sent SIGTERM to pid {}", pid);
    } else {
        tracing::warn!(
            "Failed to send SIGTERM to pid {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// Closing stdin is the only polite request available here
#[cfg(not(unix))]
pub(crate) fn request_terminate(pid: u32) {
    debug!("No terminate signal on this platform for pid {}", pid);
}
