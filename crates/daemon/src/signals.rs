// SPDX-License-Identifier: MIT

//! Signal handling.
//!
//! Six signals are caught: `HUP`, `INT`, `TERM`, `USR1`, `USR2`, `CHLD`.
//! Handlers do only async-signal-safe work — a relaxed atomic store per
//! signal plus a generic "got signal" flag, and for `CHLD` a non-blocking
//! `waitpid` loop with errno preserved around it. The flags are process-wide
//! by necessity (a signal handler has no context pointer); this module is
//! the only place permitted to touch the raw statics, and it exposes them
//! to the rest of the crate only through [`SignalFlags`]'s read-and-clear
//! API, never as mutable globals.

use std::sync::atomic::{AtomicBool, Ordering};

use sdpc_core::error::CoreError;

static GOT_HUP: AtomicBool = AtomicBool::new(false);
static GOT_INT: AtomicBool = AtomicBool::new(false);
static GOT_TERM: AtomicBool = AtomicBool::new(false);
static GOT_USR1: AtomicBool = AtomicBool::new(false);
static GOT_USR2: AtomicBool = AtomicBool::new(false);
static GOT_SIGNAL: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_hup(_sig: libc::c_int) {
    GOT_HUP.store(true, Ordering::Relaxed);
    GOT_SIGNAL.store(true, Ordering::Relaxed);
}

extern "C" fn handle_int(_sig: libc::c_int) {
    GOT_INT.store(true, Ordering::Relaxed);
    GOT_SIGNAL.store(true, Ordering::Relaxed);
}

extern "C" fn handle_term(_sig: libc::c_int) {
    GOT_TERM.store(true, Ordering::Relaxed);
    GOT_SIGNAL.store(true, Ordering::Relaxed);
}

extern "C" fn handle_usr1(_sig: libc::c_int) {
    GOT_USR1.store(true, Ordering::Relaxed);
    GOT_SIGNAL.store(true, Ordering::Relaxed);
}

extern "C" fn handle_usr2(_sig: libc::c_int) {
    GOT_USR2.store(true, Ordering::Relaxed);
    GOT_SIGNAL.store(true, Ordering::Relaxed);
}

/// Reaps zombie children with a non-blocking wait, preserving `errno`
/// around the call.
extern "C" fn handle_chld(_sig: libc::c_int) {
    let saved_errno = errno();
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: waitpid with WNOHANG never blocks; a -1/ECHILD return
        // just means there is nothing left to reap.
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
    }
    GOT_SIGNAL.store(true, Ordering::Relaxed);
    set_errno(saved_errno);
}

fn errno() -> i32 {
    // SAFETY: reading the thread-local errno location is always sound.
    unsafe { *libc::__errno_location() }
}

fn set_errno(value: i32) {
    // SAFETY: writing back a value this same thread just read is always sound.
    unsafe { *libc::__errno_location() = value };
}

/// Install handlers for `HUP`, `INT`, `TERM`, `USR1`, `USR2`, `CHLD` with
/// restartable system-call semantics (`SA_RESTART`) and an empty additional
/// signal mask.
#[allow(unsafe_code)]
pub fn install_signal_handlers() -> Result<(), CoreError> {
    install(libc::SIGHUP, handle_hup)?;
    install(libc::SIGINT, handle_int)?;
    install(libc::SIGTERM, handle_term)?;
    install(libc::SIGUSR1, handle_usr1)?;
    install(libc::SIGUSR2, handle_usr2)?;
    install(libc::SIGCHLD, handle_chld)?;
    Ok(())
}

#[allow(unsafe_code)]
fn install(signum: libc::c_int, handler: extern "C" fn(libc::c_int)) -> Result<(), CoreError> {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = handler as usize;
    action.sa_flags = libc::SA_RESTART;
    // SAFETY: an empty mask is valid for sigemptyset's out-parameter.
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
    }

    // SAFETY: `action` is a fully initialized sigaction; sigaction() is
    // sound to call with a valid signum and a static function pointer.
    let rc = unsafe { libc::sigaction(signum, &action, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(CoreError::Fork(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Read-and-clear snapshot of the sticky flags, taken once per loop
/// iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalFlags {
    pub hup: bool,
    pub int: bool,
    pub term: bool,
    pub usr1: bool,
    pub usr2: bool,
}

impl SignalFlags {
    pub fn any(&self) -> bool {
        self.hup || self.int || self.term || self.usr1 || self.usr2
    }
}

/// Atomically take and clear every sticky flag.
pub fn take() -> SignalFlags {
    if !GOT_SIGNAL.swap(false, Ordering::Relaxed) {
        return SignalFlags::default();
    }
    SignalFlags {
        hup: GOT_HUP.swap(false, Ordering::Relaxed),
        int: GOT_INT.swap(false, Ordering::Relaxed),
        term: GOT_TERM.swap(false, Ordering::Relaxed),
        usr1: GOT_USR1.swap(false, Ordering::Relaxed),
        usr2: GOT_USR2.swap(false, Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn take_clears_flags_after_read() {
        // Drain anything left over from a previous test in this process.
        take();

        GOT_HUP.store(true, Ordering::Relaxed);
        GOT_SIGNAL.store(true, Ordering::Relaxed);

        let flags = take();
        assert!(flags.hup);
        assert!(!flags.int);

        let again = take();
        assert!(!again.any());
    }
}
