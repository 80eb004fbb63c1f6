// SPDX-License-Identifier: MIT

//! PID-file locking.
//!
//! Opens with `OpenOptions::new().write(true).create(true)` then takes
//! `fs2::FileExt::try_lock_exclusive`, only truncating once the lock is
//! held so a losing process never wipes the winner's PID. Mode is forced
//! to `0600` and the descriptor marked close-on-exec.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use fs2::FileExt;

use sdpc_core::error::CoreError;

/// Outcome of attempting to acquire the PID-file lock.
pub enum PidLock {
    /// This process now holds the lock; the descriptor must be kept open
    /// (and not dropped) for the process lifetime.
    Acquired(File),
    /// Another live process holds the lock. Not an error — the PID read
    /// from the file is the existing owner.
    HeldBy(u32),
}

/// Acquire the PID-file lock. On success, writes the current PID followed
/// by a newline and flushes, keeping the descriptor open so the lock
/// persists as long as the process runs.
pub fn acquire(path: &Path) -> Result<PidLock, CoreError> {
    sdpc_core::permissions::verify_permissions(path)?;

    let file = OpenOptions::new()
        .write(true)
        .read(true)
        .create(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| CoreError::fs(path, e))?;

    set_close_on_exec(&file);

    match file.try_lock_exclusive() {
        Ok(()) => {
            let mut file = file;
            write_pid(&mut file, path)?;
            Ok(PidLock::Acquired(file))
        }
        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            let holder = read_pid(path).unwrap_or(0);
            Ok(PidLock::HeldBy(holder))
        }
        Err(e) => Err(CoreError::fs(path, e)),
    }
}

fn write_pid(file: &mut File, path: &Path) -> Result<(), CoreError> {
    file.set_len(0).map_err(|e| CoreError::fs(path, e))?;
    writeln!(file, "{}", std::process::id()).map_err(|e| CoreError::fs(path, e))?;
    file.flush().map_err(|e| CoreError::fs(path, e))?;
    Ok(())
}

/// Read the PID recorded in the PID file. `stat`s the file first per the
/// same trust check `acquire` runs (a logged, non-fatal check). An
/// unreadable or absent file is treated as "no running instance" rather
/// than an error.
pub fn read_pid(path: &Path) -> Option<u32> {
    let _ = sdpc_core::permissions::verify_permissions(path);
    let mut text = String::new();
    File::open(path).ok()?.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}

fn set_close_on_exec(file: &File) {
    set_close_on_exec_inner(file.as_raw_fd());
}

#[allow(unsafe_code)]
fn set_close_on_exec_inner(fd: i32) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
}
