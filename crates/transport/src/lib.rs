// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! sdpc-transport: the transport facade. A narrow contract over the TLS
//! control session, consumed — not interrogated — by the control loop:
//! connect (optionally preceded by an SPA knock), send one framed message,
//! poll at most one queued inbound message, disconnect.
//!
//! This crate ships a real implementation of both the TLS handshake
//! (`TlsTransport`) and the SPA packet format (`spa::send_spa`), because
//! the facade boundary — not the bytes on the wire — is what the control
//! loop's tests exercise. A `FakeTransport` gives the loop a deterministic
//! double for everything else.

pub mod spa;
mod tls;
mod traced;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use sdpc_core::client::ConnState;
pub use tls::{TlsConfig, TlsTransport};
pub use traced::TracedTransport;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed after {attempts} attempts: {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("SPA knock failed: {0}")]
    Spa(#[source] std::io::Error),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Parameters for a single `connect` attempt.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub ctrl_addr: SocketAddr,
    pub server_name: String,
    pub use_spa: bool,
    pub spa_addr: SocketAddr,
    pub spa_encryption_key: sdpc_core::bytes::SecretBytes,
    pub spa_hmac_key: sdpc_core::bytes::SecretBytes,
    pub post_spa_delay: Duration,
    pub max_conn_attempts: u32,
    pub init_conn_retry_interval: Duration,
}

/// The transport facade contract.
#[async_trait]
pub trait Transport: Send {
    /// If `params.use_spa`, emit a Single Packet Authorization, wait
    /// `post_spa_delay`, then establish the TLS session with up to
    /// `max_conn_attempts` attempts at `init_conn_retry_interval` spacing.
    /// The facade owns that retry; the loop observes only the final
    /// outcome.
    async fn connect(&mut self, params: &ConnectParams) -> Result<(), TransportError>;

    /// Idempotent: calling `disconnect` while already disconnected succeeds.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Enqueue or transmit one framed message; may block up to
    /// `write_timeout`.
    async fn send_msg(&mut self, text: &str, write_timeout: Duration) -> Result<(), TransportError>;

    /// Non-blocking read of at most one pending message. `None` means
    /// nothing queued, not an error.
    async fn get_msg(&mut self) -> Result<Option<String>, TransportError>;

    /// Observable connection state.
    fn conn_state(&self) -> ConnState;

    /// Replace the in-memory SPA keys used for future knocks, after the
    /// credential store has durably applied a rotated bundle. Only after
    /// all four credential-store writes succeed are these in-memory keys
    /// replaced.
    fn rotate_spa_keys(
        &mut self,
        encryption_key: sdpc_core::bytes::SecretBytes,
        hmac_key: sdpc_core::bytes::SecretBytes,
    );
}
