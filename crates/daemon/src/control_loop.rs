// SPDX-License-Identifier: MIT

//! The control loop / state machine. Single-threaded cooperative: reconnect,
//! drain inbound messages, consider credential and keep-alive refresh,
//! handle pending signals, sleep one second, repeat.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use sdpc_codec::{self as codec, InboundResult, Stage, Subject};
use sdpc_core::client::{Client, ClientState, ConnState};
use sdpc_core::clock::Clock;
use sdpc_core::config::Config;
use sdpc_core::error::CoreError;
use sdpc_credstore::{CredStorePaths, CredStoreWriter};
use sdpc_transport::{ConnectParams, Transport};
use tracing::{info, warn};

use crate::signals::{self, SignalFlags};

/// Why the loop stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `remain_connected == false` and the one credential update it was
    /// waiting for has landed.
    OneShotComplete,
    /// `INT` or `TERM` observed.
    Signal,
}

/// Run the control loop to completion. `reload` is called on `HUP` to
/// re-read the config file and hands back the freshly parsed value, which
/// is applied via `Client::reinit` without ever releasing the caller's
/// PID-file lock.
pub async fn run<T, W, C, R>(
    client: &mut Client,
    transport: &mut T,
    credstore_writer: &W,
    clock: &C,
    mut reload: R,
) -> Result<ExitReason, CoreError>
where
    T: Transport,
    W: CredStoreWriter,
    C: Clock,
    R: FnMut() -> Result<Config, CoreError>,
{
    'outer: loop {
        // (1) reconnect if disconnected.
        if transport.conn_state() == ConnState::Disconnected {
            match reconnect(client, transport).await {
                Ok(()) => {
                    let now = clock.now();
                    client.initial_conn_time = now;
                    client.last_contact = now;
                    client.clear_request_vars();
                }
                Err(e) => return Err(e),
            }
        }

        // (2) drain up to msg_q_len inbound messages. A receive failure
        // disconnects and skips the rest of this iteration entirely — steps
        // 3/7 below would otherwise see a disconnected transport and hand
        // `ConnDown` straight out of `run()` via `?`, killing the daemon on
        // what should be a retried-next-iteration transient failure.
        for _ in 0..client.msg_q_len {
            match transport.get_msg().await {
                Ok(Some(text)) => dispatch_inbound(client, transport, credstore_writer, clock, &text).await?,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "receive failed, will reconnect next iteration");
                    let _ = transport.disconnect().await;
                    continue 'outer;
                }
            }
        }

        // (3) consider credential refresh.
        if client.client_state == ClientState::Ready
            && client.cred_update_due(clock.now())
            && client.client_state.allows_request()
        {
            send_request(client, transport, clock, Subject::CredUpdate).await?;
        }

        // (4) access refresh: compile-time gated, off by default. No wire
        // subject is defined for it, so the default build only tracks the
        // timer without emitting a request.
        #[cfg(feature = "access-refresh")]
        if client.access_update_due(clock.now()) {
            client.last_access_update = clock.now();
        }

        // (5) one-shot completion.
        if !client.remain_connected && client.last_cred_update > 0 {
            let _ = transport.disconnect().await;
            return Ok(ExitReason::OneShotComplete);
        }

        // (6) handle pending signals.
        let flags = signals::take();
        if flags.int || flags.term {
            let _ = transport.disconnect().await;
            return Ok(ExitReason::Signal);
        }
        if flags.hup {
            info!("HUP received, reinitializing in place");
            let config = reload()?;
            client.reinit(&config);
            let _ = transport.disconnect().await;
            continue;
        }

        // (7) consider keep-alive.
        if client.client_state == ClientState::Ready && client.keep_alive_due(clock.now()) {
            send_request(client, transport, clock, Subject::KeepAlive).await?;
        }

        // Requesting/Unfulfilled retry handling happens here, after the
        // due-checks above, so a freshly sent request isn't immediately
        // re-evaluated for retry in the same iteration.
        handle_retry(client, transport, clock).await?;

        // (8) sleep one second.
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn reconnect<T: Transport>(client: &mut Client, transport: &mut T) -> Result<(), CoreError> {
    let ctrl_addr = resolve_addr(&client.ctrl_addr, client.ctrl_port)?;
    let params = ConnectParams {
        ctrl_addr,
        server_name: client.ctrl_addr.clone(),
        use_spa: client.use_spa,
        spa_addr: ctrl_addr,
        spa_encryption_key: client.spa_encryption_key.clone(),
        spa_hmac_key: client.spa_hmac_key.clone(),
        post_spa_delay: client.post_spa_delay,
        max_conn_attempts: client.max_conn_attempts,
        init_conn_retry_interval: client.initial_conn_retry_interval,
    };
    transport
        .connect(&params)
        .await
        .map_err(|e| CoreError::fs(&client.pid_file, std::io::Error::other(e.to_string())))
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, CoreError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| CoreError::fs(host, e))?
        .next()
        .ok_or_else(|| CoreError::fs(host, std::io::Error::other("no addresses resolved")))
}

async fn send_request<T: Transport, C: Clock>(
    client: &mut Client,
    transport: &mut T,
    clock: &C,
    subject: Subject,
) -> Result<(), CoreError> {
    if transport.conn_state() != ConnState::Connected {
        return Err(CoreError::ConnDown);
    }
    if !client.client_state.allows_request() {
        return Err(CoreError::State);
    }

    let stage = matches!(subject, Subject::CredUpdate).then_some(Stage::Requesting);
    let text = codec::make(subject, stage);
    transport
        .send_msg(&text, client.write_timeout)
        .await
        .map_err(|e| request_error(subject, e.to_string()))?;

    let now = clock.now();
    client.record_request_sent(now);
    client.client_state = match subject {
        Subject::KeepAlive => ClientState::KeepAliveRequesting,
        Subject::CredUpdate => ClientState::CredRequesting,
    };
    Ok(())
}

fn request_error(subject: Subject, detail: String) -> CoreError {
    match subject {
        Subject::KeepAlive => CoreError::KeepAlive(detail),
        Subject::CredUpdate => CoreError::CredReq(detail),
    }
}

async fn dispatch_inbound<T: Transport, W: CredStoreWriter, C: Clock>(
    client: &mut Client,
    transport: &mut T,
    credstore_writer: &W,
    clock: &C,
    text: &str,
) -> Result<(), CoreError> {
    let result = match codec::process(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed inbound message, dropping");
            return Ok(());
        }
    };

    match result {
        InboundResult::KeepAliveFulfilling => {
            if client.client_state == ClientState::KeepAliveRequesting
                || client.client_state == ClientState::KeepAliveUnfulfilled
            {
                client.last_contact = clock.now();
                client.clear_request_vars();
            }
        }
        InboundResult::CredsFulfilling(bundle) => {
            if client.client_state == ClientState::CredRequesting
                || client.client_state == ClientState::CredUnfulfilled
            {
                let paths = CredStorePaths {
                    cert_path: client.cert_file.clone(),
                    key_path: client.key_file.clone(),
                    client_config_path: client.client_config_file.clone(),
                    fwknop_config_path: client.fwknop_config_file.clone(),
                };
                sdpc_credstore::apply_rotation(credstore_writer, &paths, &bundle)
                    .map_err(|e| CoreError::CredReq(e.to_string()))?;

                transport.rotate_spa_keys(bundle.spa_encryption_key, bundle.spa_hmac_key);

                let ack = codec::make(Subject::CredUpdate, Some(Stage::Fulfilled));
                transport
                    .send_msg(&ack, client.write_timeout)
                    .await
                    .map_err(|e| CoreError::CredReq(e.to_string()))?;

                let now = clock.now();
                client.last_cred_update = now;
                client.last_contact = now;
                client.clear_request_vars();
            }
        }
        InboundResult::BadResult => {
            warn!("received well-formed but unrecognized result tag, dropping");
        }
    }
    Ok(())
}

/// Retry/backoff/attempt-cap handling for `*Requesting`/`*Unfulfilled`
/// states.
async fn handle_retry<T: Transport, C: Clock>(
    client: &mut Client,
    transport: &mut T,
    clock: &C,
) -> Result<(), CoreError> {
    let in_request_cycle = matches!(
        client.client_state,
        ClientState::KeepAliveRequesting
            | ClientState::KeepAliveUnfulfilled
            | ClientState::CredRequesting
            | ClientState::CredUnfulfilled
    );
    if !in_request_cycle {
        return Ok(());
    }

    let now = clock.now();
    let retry_due = now >= client.last_req_time + client.req_retry_interval.as_secs();
    if !retry_due {
        return Ok(());
    }

    if client.attempts_exhausted() {
        client.client_state = ClientState::TimeToQuit;
        let _ = transport.disconnect().await;
        return Err(CoreError::ManyFailedReqs);
    }

    let subject = match client.client_state {
        ClientState::KeepAliveRequesting | ClientState::KeepAliveUnfulfilled => Subject::KeepAlive,
        _ => Subject::CredUpdate,
    };
    let stage = matches!(subject, Subject::CredUpdate).then_some(Stage::Requesting);

    client.double_retry_interval();
    let text = codec::make(subject, stage);
    transport
        .send_msg(&text, client.write_timeout)
        .await
        .map_err(|e| request_error(subject, e.to_string()))?;
    client.record_request_sent(now);

    client.client_state = match subject {
        Subject::KeepAlive => ClientState::KeepAliveUnfulfilled,
        Subject::CredUpdate => ClientState::CredUnfulfilled,
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdpc_core::clock::FakeClock;
    use sdpc_core::config::Config;
    use sdpc_credstore::fake::FakeCredStoreWriter;
    use sdpc_transport::fake::FakeTransport;

    fn client_with(mutate: impl FnOnce(&mut Config)) -> Client {
        let mut config = Config::defaults();
        config.ctrl_addr = "127.0.0.1".to_string();
        config.ctrl_port = 4433;
        mutate(&mut config);
        Client::from_config(&config)
    }

    #[tokio::test]
    async fn keep_alive_retry_backs_off_then_exhausts() {
        let mut client = client_with(|c| {
            c.keep_alive_interval = Duration::from_secs(0);
            c.initial_request_retry_interval = Duration::from_secs(1);
            c.max_request_attempts = 3;
        });
        let (mut transport, handle) = FakeTransport::new();
        transport.connect(&dummy_params()).await.unwrap();
        let clock = FakeClock::new(0);

        send_request(&mut client, &mut transport, &clock, Subject::KeepAlive)
            .await
            .unwrap();
        assert_eq!(client.req_attempts, 1);

        clock.advance(1);
        handle_retry(&mut client, &mut transport, &clock).await.unwrap();
        assert_eq!(client.req_attempts, 2);
        assert_eq!(client.req_retry_interval, Duration::from_secs(2));

        clock.advance(2);
        handle_retry(&mut client, &mut transport, &clock).await.unwrap();
        assert_eq!(client.req_attempts, 3);

        clock.advance(4);
        let result = handle_retry(&mut client, &mut transport, &clock).await;
        assert!(matches!(result, Err(CoreError::ManyFailedReqs)));
        assert_eq!(client.client_state, ClientState::TimeToQuit);

        assert_eq!(handle.sent().len(), 3);
    }

    #[tokio::test]
    async fn keep_alive_fulfilling_returns_to_ready_and_updates_last_contact() {
        let mut client = client_with(|_| {});
        let (mut transport, _handle) = FakeTransport::new();
        transport.connect(&dummy_params()).await.unwrap();
        let clock = FakeClock::new(100);
        let writer = FakeCredStoreWriter::new();

        client.client_state = ClientState::KeepAliveRequesting;
        dispatch_inbound(
            &mut client,
            &mut transport,
            &writer,
            &clock,
            &codec::encode_keep_alive_fulfilling(),
        )
        .await
        .unwrap();

        assert_eq!(client.client_state, ClientState::Ready);
        assert_eq!(client.last_contact, 100);
    }

    #[tokio::test]
    async fn creds_fulfilling_applies_rotation_and_acks() {
        let mut client = client_with(|_| {});
        client.cert_file = "/creds/cert.pem".into();
        client.key_file = "/creds/key.pem".into();
        client.client_config_file = "/etc/client.conf".into();
        client.fwknop_config_file = "/etc/fwknop.conf".into();
        client.client_state = ClientState::CredRequesting;

        let (mut transport, handle) = FakeTransport::new();
        transport.connect(&dummy_params()).await.unwrap();
        let clock = FakeClock::new(200);
        let writer = FakeCredStoreWriter::new();

        let bundle = sdpc_codec::CredentialBundle {
            cert_pem: "CERT".to_string(),
            key_pem: "KEY".to_string(),
            spa_encryption_key: sdpc_core::bytes::SecretBytes::new(vec![1, 2]).unwrap(),
            spa_hmac_key: sdpc_core::bytes::SecretBytes::new(vec![3, 4]).unwrap(),
        };
        let text = codec::encode_creds_fulfilling(&bundle);

        dispatch_inbound(&mut client, &mut transport, &writer, &clock, &text)
            .await
            .unwrap();

        assert_eq!(client.client_state, ClientState::Ready);
        assert_eq!(client.last_cred_update, 200);
        assert_eq!(writer.contents("/creds/cert.pem"), "CERT");
        assert_eq!(handle.sent().len(), 1);
        assert!(handle.sent()[0].contains("fulfilled"));
        assert_eq!(handle.rotated_keys().len(), 1);
    }

    fn dummy_params() -> ConnectParams {
        ConnectParams {
            ctrl_addr: "127.0.0.1:4433".parse().unwrap(),
            server_name: "127.0.0.1".to_string(),
            use_spa: false,
            spa_addr: "127.0.0.1:4433".parse().unwrap(),
            spa_encryption_key: sdpc_core::bytes::SecretBytes::new(vec![]).unwrap(),
            spa_hmac_key: sdpc_core::bytes::SecretBytes::new(vec![]).unwrap(),
            post_spa_delay: Duration::from_millis(0),
            max_conn_attempts: 1,
            init_conn_retry_interval: Duration::from_millis(0),
        }
    }
}
