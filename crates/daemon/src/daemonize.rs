// SPDX-License-Identifier: MIT

//! Forking into the background: fork, new session, `chdir("/")`, clear the
//! umask, install signal handlers, then close the three standard streams —
//! in that order, so the child never logs or touches a file descriptor
//! before it has its own session and signal disposition.
//!
//! Uses direct `libc` calls (fork/setsid/close-std-fds) rather than a
//! higher-level wrapper crate, since this is the one place in the
//! workspace unsafe code is warranted at all.

use sdpc_core::error::CoreError;

use crate::signals;

/// What the calling process should do after `fork_into_background` returns.
pub enum ForkOutcome {
    /// We are the parent; `child_pid` is the backgrounded process. The
    /// caller should print status and exit without further work.
    Parent { child_pid: i32 },
    /// We are the (grand)child that continues running as the daemon.
    Child,
}

/// Fork, then in the child: create a new session, chdir to `/`, clear the
/// umask, install signal handlers, and close stdin/stdout/stderr.
#[allow(unsafe_code)]
pub fn fork_into_background() -> Result<ForkOutcome, CoreError> {
    // SAFETY: fork() is sound to call; the result is handled by PID value.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(CoreError::Fork(std::io::Error::last_os_error()));
    }
    if pid > 0 {
        return Ok(ForkOutcome::Parent { child_pid: pid });
    }

    // SAFETY: setsid() detaches us from the controlling terminal; failure
    // here (already a session leader) is not recoverable for a forked child.
    if unsafe { libc::setsid() } < 0 {
        return Err(CoreError::Fork(std::io::Error::last_os_error()));
    }

    std::env::set_current_dir("/").map_err(CoreError::Fork)?;

    // SAFETY: umask() always succeeds and returns the previous mask.
    unsafe {
        libc::umask(0);
    }

    signals::install_signal_handlers()?;

    close_standard_streams()?;

    Ok(ForkOutcome::Child)
}

#[allow(unsafe_code)]
fn close_standard_streams() -> Result<(), CoreError> {
    let dev_null = std::ffi::CString::new("/dev/null")
        .map_err(|e| CoreError::Fork(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
    // SAFETY: open() with a valid NUL-terminated path and O_RDWR is sound;
    // the three dup2 calls redirect the standard descriptors to it.
    unsafe {
        let fd = libc::open(dev_null.as_ptr(), libc::O_RDWR);
        if fd < 0 {
            return Err(CoreError::Fork(std::io::Error::last_os_error()));
        }
        libc::dup2(fd, libc::STDIN_FILENO);
        libc::dup2(fd, libc::STDOUT_FILENO);
        libc::dup2(fd, libc::STDERR_FILENO);
        if fd > libc::STDERR_FILENO {
            libc::close(fd);
        }
    }
    Ok(())
}
