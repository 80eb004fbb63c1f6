// SPDX-License-Identifier: MIT

//! Wraps any `Transport` with `tracing` instrumentation, the same way the
//! wrapper idiom is used elsewhere in this workspace to keep call-site
//! logging out of both the trait contract and its implementations.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use sdpc_core::bytes::SecretBytes;
use sdpc_core::client::ConnState;

use crate::{ConnectParams, Transport, TransportError};

pub struct TracedTransport<T> {
    inner: T,
}

impl<T> TracedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for TracedTransport<T> {
    async fn connect(&mut self, params: &ConnectParams) -> Result<(), TransportError> {
        debug!(addr = %params.ctrl_addr, use_spa = params.use_spa, "connecting");
        let result = self.inner.connect(params).await;
        if let Err(ref e) = result {
            warn!(error = %e, "connect failed");
        }
        result
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        debug!("disconnecting");
        self.inner.disconnect().await
    }

    async fn send_msg(&mut self, text: &str, write_timeout: Duration) -> Result<(), TransportError> {
        debug!(len = text.len(), "sending message");
        let result = self.inner.send_msg(text, write_timeout).await;
        if let Err(ref e) = result {
            warn!(error = %e, "send failed");
        }
        result
    }

    async fn get_msg(&mut self) -> Result<Option<String>, TransportError> {
        let result = self.inner.get_msg().await;
        if let Ok(Some(ref text)) = result {
            debug!(len = text.len(), "received message");
        }
        if let Err(ref e) = result {
            warn!(error = %e, "receive failed");
        }
        result
    }

    fn conn_state(&self) -> ConnState {
        self.inner.conn_state()
    }

    fn rotate_spa_keys(&mut self, encryption_key: SecretBytes, hmac_key: SecretBytes) {
        debug!("rotating SPA keys");
        self.inner.rotate_spa_keys(encryption_key, hmac_key);
    }
}
