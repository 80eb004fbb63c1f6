// SPDX-License-Identifier: MIT

//! The control-client error taxonomy. The control loop folds every
//! crate-local error type (`ConfigError`, `CodecError`, `TransportError`,
//! `CredStoreError`) into one of these variants — typically by rendering
//! the source error into the `String` carried by `KeepAlive`/`CredReq` —
//! so callers only ever match on this one enum regardless of which
//! component failed.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation attempted on a context that has not completed configuration.
    #[error("client context is not initialized")]
    Uninitialized,

    /// Any allocation failure, or (more realistically in safe Rust) a
    /// poisoned lock encountered while copying rotated keys into the
    /// transport facade after an on-disk credential update has already
    /// succeeded.
    #[error("memory operation failed: {0}")]
    MemoryAllocation(String),

    /// `fork()` or a sibling daemonization step failed.
    #[error("fork failed: {0}")]
    Fork(#[source] std::io::Error),

    /// open/lock/read/write/stat against the PID file or a credential file.
    #[error("filesystem operation on {path} failed: {source}")]
    FilesystemOperation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The PID-file lock is already held by another live instance.
    #[error("another instance is already running (pid {0})")]
    ProcExists(u32),

    /// A request was attempted while the transport facade was disconnected.
    #[error("request attempted while disconnected")]
    ConnDown,

    /// A request was attempted in a `client_state` that disallows it.
    #[error("request attempted in a state that disallows it")]
    State,

    /// Transport or codec failure during a keep-alive exchange.
    #[error("keep-alive exchange failed: {0}")]
    KeepAlive(String),

    /// Transport or codec failure during a credential-update exchange.
    #[error("credential-update exchange failed: {0}")]
    CredReq(String),

    /// Exceeded `max_request_attempts`; the loop transitions to `TimeToQuit`.
    #[error("exceeded maximum request attempts")]
    ManyFailedReqs,

    /// Loop exit due to `INT`/`TERM`.
    #[error("exiting on signal")]
    GotExitSig,
}

impl CoreError {
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FilesystemOperation {
            path: path.into(),
            source,
        }
    }
}
