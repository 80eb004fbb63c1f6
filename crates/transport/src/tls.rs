// SPDX-License-Identifier: MIT

//! The real `Transport` adapter: a mutually authenticated TLS session over
//! TCP, newline-framed JSON messages, kept behind the `Transport` trait so
//! the control loop never sees `rustls` types.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use sdpc_core::bytes::SecretBytes;
use sdpc_core::client::ConnState;

use crate::spa;
use crate::{ConnectParams, Transport, TransportError};

/// Where to find the TLS client identity. Reloaded on every `connect` so a
/// credential rotation that lands before a reconnect is picked up without
/// restarting the transport.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// CA bundle to verify the controller's certificate. When absent, the
    /// platform's native root store is used instead (see DESIGN.md for the
    /// reasoning).
    pub ca_path: Option<PathBuf>,
}

pub struct TlsTransport {
    tls_config: TlsConfig,
    client_id: String,
    stream: Option<BufReader<TlsStream<TcpStream>>>,
    state: ConnState,
    spa_encryption_key: SecretBytes,
    spa_hmac_key: SecretBytes,
}

impl TlsTransport {
    pub fn new(
        tls_config: TlsConfig,
        client_id: String,
        spa_encryption_key: SecretBytes,
        spa_hmac_key: SecretBytes,
    ) -> Self {
        Self {
            tls_config,
            client_id,
            stream: None,
            state: ConnState::Disconnected,
            spa_encryption_key,
            spa_hmac_key,
        }
    }

    fn build_client_config(&self) -> Result<ClientConfig, TransportError> {
        let roots = load_root_store(self.tls_config.ca_path.as_deref())?;
        let certs = load_certs(&self.tls_config.cert_path)?;
        let key = load_private_key(&self.tls_config.key_path)?;

        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| TransportError::Tls(e.to_string()))
    }

    async fn connect_once(&mut self, params: &ConnectParams) -> Result<(), TransportError> {
        let client_config = self.build_client_config()?;
        let connector = TlsConnector::from(Arc::new(client_config));

        let tcp = TcpStream::connect(params.ctrl_addr)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                attempts: 1,
                source: e,
            })?;

        let server_name = ServerName::try_from(params.server_name.clone())
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                attempts: 1,
                source: e,
            })?;

        self.stream = Some(BufReader::new(tls));
        self.state = ConnState::Connected;
        Ok(())
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn connect(&mut self, params: &ConnectParams) -> Result<(), TransportError> {
        if params.use_spa {
            spa::send_spa(
                params.spa_addr,
                &self.client_id,
                &self.spa_encryption_key,
                &self.spa_hmac_key,
            )
            .await
            .map_err(TransportError::Spa)?;
            tokio::time::sleep(params.post_spa_delay).await;
        }

        let mut last_err = None;
        for attempt in 1..=params.max_conn_attempts.max(1) {
            match self.connect_once(params).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < params.max_conn_attempts {
                        tokio::time::sleep(params.init_conn_retry_interval).await;
                    }
                }
            }
        }

        self.state = ConnState::Disconnected;
        Err(last_err.unwrap_or(TransportError::ConnectFailed {
            attempts: params.max_conn_attempts,
            source: io::Error::new(io::ErrorKind::Other, "no connection attempts made"),
        }))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            // Best-effort: a broken peer need not stop us from tearing down.
            let _ = stream.shutdown().await;
        }
        self.state = ConnState::Disconnected;
        Ok(())
    }

    async fn send_msg(&mut self, text: &str, write_timeout: Duration) -> Result<(), TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Send(io::Error::new(io::ErrorKind::NotConnected, "not connected")))?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        tokio::time::timeout(write_timeout, async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| TransportError::WriteTimeout(write_timeout))?
        .map_err(TransportError::Send)
    }

    async fn get_msg(&mut self) -> Result<Option<String>, TransportError> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(None),
        };

        let mut line = String::new();
        match tokio::time::timeout(Duration::from_millis(0), stream.read_line(&mut line)).await {
            Ok(Ok(0)) => {
                self.state = ConnState::Disconnected;
                Err(TransportError::Receive(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                )))
            }
            Ok(Ok(_)) => Ok(Some(line.trim_end().to_string())),
            Ok(Err(e)) => Err(TransportError::Receive(e)),
            Err(_) => Ok(None),
        }
    }

    fn conn_state(&self) -> ConnState {
        self.state
    }

    fn rotate_spa_keys(&mut self, encryption_key: SecretBytes, hmac_key: SecretBytes) {
        self.spa_encryption_key = encryption_key;
        self.spa_hmac_key = hmac_key;
    }
}

fn load_root_store(ca_path: Option<&Path>) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();

    if let Some(path) = ca_path {
        let certs = load_certs(path)?;
        for cert in certs {
            roots
                .add(cert)
                .map_err(|e| TransportError::Tls(e.to_string()))?;
        }
        return Ok(roots);
    }

    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        let _ = roots.add(cert);
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let bytes = std::fs::read(path)
        .map_err(|e| TransportError::Tls(format!("reading {}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Tls(format!("parsing {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let bytes = std::fs::read(path)
        .map_err(|e| TransportError::Tls(format!("reading {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut bytes.as_slice())
        .map_err(|e| TransportError::Tls(format!("parsing {}: {e}", path.display())))?
        .ok_or_else(|| TransportError::Tls(format!("no private key found in {}", path.display())))
}
