// SPDX-License-Identifier: MIT

//! A deterministic `Transport` double for control-loop tests (mirrors the
//! `Fake*` adapter-double pattern used throughout the rest of this
//! workspace's test-support features).

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sdpc_core::bytes::SecretBytes;
use sdpc_core::client::ConnState;

use crate::{ConnectParams, Transport, TransportError};

/// Shared, interior-mutable state so a test can push inbound messages or
/// inspect sent ones while the loop holds the `FakeTransport` by value.
#[derive(Default)]
struct Shared {
    sent: Vec<String>,
    inbound: VecDeque<String>,
    connect_calls: u32,
    fail_next_connects: u32,
    fail_next_get_msg: u32,
    rotated_keys: Vec<(Vec<u8>, Vec<u8>)>,
}

pub struct FakeTransport {
    shared: std::sync::Arc<Mutex<Shared>>,
    state: ConnState,
}

/// A cheap handle a test keeps alongside the `FakeTransport` it hands to
/// the loop, to inspect what the loop sent and queue what it should
/// receive next.
#[derive(Clone)]
pub struct FakeTransportHandle {
    shared: std::sync::Arc<Mutex<Shared>>,
}

impl FakeTransportHandle {
    pub fn push_inbound(&self, text: impl Into<String>) {
        self.shared.lock().inbound.push_back(text.into());
    }

    pub fn sent(&self) -> Vec<String> {
        self.shared.lock().sent.clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.shared.lock().connect_calls
    }

    /// The next `n` calls to `connect` fail before any TLS/SPA work runs.
    pub fn fail_next_connects(&self, n: u32) {
        self.shared.lock().fail_next_connects = n;
    }

    /// The next `n` calls to `get_msg` return a receive error instead of
    /// polling the inbound queue.
    pub fn fail_next_get_msg(&self, n: u32) {
        self.shared.lock().fail_next_get_msg = n;
    }

    pub fn rotated_keys(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.shared.lock().rotated_keys.clone()
    }
}

impl FakeTransport {
    pub fn new() -> (Self, FakeTransportHandle) {
        let shared = std::sync::Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: shared.clone(),
                state: ConnState::Disconnected,
            },
            FakeTransportHandle { shared },
        )
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self, _params: &ConnectParams) -> Result<(), TransportError> {
        let mut shared = self.shared.lock();
        shared.connect_calls += 1;
        if shared.fail_next_connects > 0 {
            shared.fail_next_connects -= 1;
            drop(shared);
            self.state = ConnState::Disconnected;
            return Err(TransportError::ConnectFailed {
                attempts: 1,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "fake connect failure"),
            });
        }
        drop(shared);
        self.state = ConnState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.state = ConnState::Disconnected;
        Ok(())
    }

    async fn send_msg(&mut self, text: &str, _write_timeout: Duration) -> Result<(), TransportError> {
        if self.state != ConnState::Connected {
            return Err(TransportError::Send(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected",
            )));
        }
        self.shared.lock().sent.push(text.to_string());
        Ok(())
    }

    async fn get_msg(&mut self) -> Result<Option<String>, TransportError> {
        let mut shared = self.shared.lock();
        if shared.fail_next_get_msg > 0 {
            shared.fail_next_get_msg -= 1;
            return Err(TransportError::Receive(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "fake receive failure",
            )));
        }
        Ok(shared.inbound.pop_front())
    }

    fn conn_state(&self) -> ConnState {
        self.state
    }

    fn rotate_spa_keys(&mut self, encryption_key: SecretBytes, hmac_key: SecretBytes) {
        self.shared
            .lock()
            .rotated_keys
            .push((encryption_key.as_bytes().to_vec(), hmac_key.as_bytes().to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_transport_queues_and_delivers_inbound() {
        let (mut transport, handle) = FakeTransport::new();
        handle.push_inbound("hello");
        assert_eq!(transport.get_msg().await.unwrap(), Some("hello".to_string()));
        assert_eq!(transport.get_msg().await.unwrap(), None);
    }

    #[tokio::test]
    async fn fake_transport_fails_requested_connects() {
        let (mut transport, handle) = FakeTransport::new();
        handle.fail_next_connects(2);

        let params = dummy_params();
        assert!(transport.connect(&params).await.is_err());
        assert!(transport.connect(&params).await.is_err());
        assert!(transport.connect(&params).await.is_ok());
        assert_eq!(handle.connect_calls(), 3);
    }

    fn dummy_params() -> ConnectParams {
        ConnectParams {
            ctrl_addr: "127.0.0.1:4433".parse().unwrap(),
            server_name: "ctrl.example".to_string(),
            use_spa: false,
            spa_addr: "127.0.0.1:62201".parse().unwrap(),
            spa_encryption_key: SecretBytes::new(vec![1; 16]).unwrap(),
            spa_hmac_key: SecretBytes::new(vec![2; 16]).unwrap(),
            post_spa_delay: Duration::from_millis(0),
            max_conn_attempts: 1,
            init_conn_retry_interval: Duration::from_millis(0),
        }
    }
}
