// SPDX-License-Identifier: MIT

//! Start/stop/restart/status.
//!
//! These are the operations the `sdpc` CLI drives directly. There is no
//! local IPC: `stop`/`restart`/`status` only need the PID file and
//! `kill(2)`, so they live here rather than behind a socket protocol.

use std::path::Path;
use std::time::Duration;

use sdpc_core::error::CoreError;

use crate::daemonize::{self, ForkOutcome};
use crate::pidfile::{self, PidLock};
use crate::signals;

/// Outcome of `start`.
pub enum StartOutcome {
    /// Backgrounded: this process is the parent and has nothing further
    /// to do. `child_pid` is the daemon's PID.
    Forked { child_pid: i32 },
    /// Running in foreground, or we are the forked child: caller should
    /// proceed to enter the control loop, holding `_lock` for the
    /// process's remaining lifetime.
    Continue { _lock: std::fs::File },
}

/// Acquire the PID lock and, unless running in the foreground, fork into
/// the background.
pub fn start(pid_file: &Path, foreground: bool) -> Result<StartOutcome, CoreError> {
    if !foreground {
        match daemonize::fork_into_background()? {
            ForkOutcome::Parent { child_pid } => return Ok(StartOutcome::Forked { child_pid }),
            ForkOutcome::Child => {}
        }
    } else {
        signals::install_signal_handlers()?;
    }

    match pidfile::acquire(pid_file)? {
        PidLock::Acquired(file) => Ok(StartOutcome::Continue { _lock: file }),
        PidLock::HeldBy(pid) => Err(CoreError::ProcExists(pid)),
    }
}

/// Signal the running instance to stop. Sends `TERM`, then polls liveness
/// with signal 0; escalates to `KILL` only after the target is still alive
/// past the grace period, rather than treating "still alive immediately
/// after TERM" as a failure.
pub fn stop(pid_file: &Path) -> Result<(), CoreError> {
    let pid = pidfile::read_pid(pid_file).ok_or(CoreError::Uninitialized)?;

    send_signal(pid, libc::SIGTERM)?;

    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while std::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    if !is_alive(pid) {
        return Ok(());
    }

    send_signal(pid, libc::SIGKILL)?;

    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while std::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    Err(CoreError::fs(
        pid_file,
        std::io::Error::new(std::io::ErrorKind::TimedOut, "process did not exit after SIGKILL"),
    ))
}

/// Signal the running instance to reinit in place.
pub fn restart(pid_file: &Path) -> Result<(), CoreError> {
    let pid = pidfile::read_pid(pid_file).ok_or(CoreError::Uninitialized)?;
    send_signal(pid, libc::SIGHUP)
}

/// Outcome of `status`.
pub enum StatusOutcome {
    Running {
        pid: u32,
        /// Seconds since the PID file's last modification, as a best-effort
        /// proxy for how long the instance has been running. `None` if the
        /// file's mtime couldn't be read.
        uptime_secs: Option<u64>,
    },
    NotRunning,
}

/// Attempt to acquire the PID lock; if contended, report the holder's PID
/// as running and release immediately.
pub fn status(pid_file: &Path) -> Result<StatusOutcome, CoreError> {
    match pidfile::acquire(pid_file)? {
        PidLock::Acquired(_file) => {
            // Dropping `_file` releases the lock we just took purely to probe.
            Ok(StatusOutcome::NotRunning)
        }
        PidLock::HeldBy(pid) => Ok(StatusOutcome::Running {
            pid,
            uptime_secs: pid_file_uptime(pid_file),
        }),
    }
}

fn pid_file_uptime(pid_file: &Path) -> Option<u64> {
    let modified = std::fs::metadata(pid_file).ok()?.modified().ok()?;
    std::time::SystemTime::now().duration_since(modified).ok().map(|d| d.as_secs())
}

#[allow(unsafe_code)]
fn send_signal(pid: u32, sig: libc::c_int) -> Result<(), CoreError> {
    // SAFETY: kill() with a valid pid and signal number is sound; the
    // return value alone communicates failure.
    let rc = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if rc != 0 {
        return Err(CoreError::fs(
            Path::new("<pid>"),
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[allow(unsafe_code)]
fn is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action beyond existence/permission checks.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_not_running_for_fresh_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.pid");

        match status(&path).unwrap() {
            StatusOutcome::NotRunning => {}
            StatusOutcome::Running { .. } => panic!("expected not running"),
        }
    }

    #[test]
    fn status_reports_running_while_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.pid");
        let _lock = pidfile::acquire(&path).unwrap();

        match status(&path).unwrap() {
            StatusOutcome::Running { pid, uptime_secs } => {
                assert_eq!(pid, std::process::id());
                assert!(uptime_secs.is_some());
            }
            StatusOutcome::NotRunning => panic!("expected running"),
        }
    }

    #[test]
    fn stop_with_no_pid_file_is_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.pid");
        assert!(matches!(stop(&path), Err(CoreError::Uninitialized)));
    }
}
