// SPDX-License-Identifier: MIT

//! The `Client` context: the long-lived aggregate owned by the process for
//! its whole lifetime, passed by exclusive reference through the control
//! loop rather than threaded around as a shared pointer.

use std::path::PathBuf;
use std::time::Duration;

use crate::bytes::SecretBytes;
use crate::config::Config;

/// Connection state, owned by the transport facade and only observed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    Disconnected,
}

/// The control loop's state machine. Modified only by the control loop;
/// signal handlers never touch it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Ready,
    KeepAliveRequesting,
    KeepAliveUnfulfilled,
    CredRequesting,
    CredUnfulfilled,
    TimeToQuit,
}

impl ClientState {
    /// States in which a keep-alive or cred-update request may be emitted.
    pub fn allows_request(self) -> bool {
        !matches!(self, ClientState::TimeToQuit)
    }
}

/// Identity, policy, mode, and runtime-state fields of the long-lived client
/// context.
#[derive(Debug, Clone)]
pub struct Client {
    // -- identity/config --
    pub ctrl_addr: String,
    pub ctrl_port: u16,
    /// This client's own identity, from `CTRL_STANZA` — the value the SPA
    /// packet uses to identify the sender. Distinct from `ctrl_addr`, which
    /// is the *controller's* address.
    pub client_id: String,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub client_config_file: PathBuf,
    pub fwknop_config_file: PathBuf,
    pub pid_file: PathBuf,
    pub spa_encryption_key: SecretBytes,
    pub spa_hmac_key: SecretBytes,

    // -- policy timers --
    pub cred_update_interval: Duration,
    pub access_update_interval: Duration,
    pub keep_alive_interval: Duration,
    pub initial_req_retry_interval: Duration,
    pub max_req_attempts: u32,
    pub initial_conn_retry_interval: Duration,
    pub max_conn_attempts: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub msg_q_len: usize,
    pub post_spa_delay: Duration,

    // -- mode flags --
    pub foreground: bool,
    pub remain_connected: bool,
    pub use_spa: bool,
    pub use_syslog: bool,
    pub verbosity: u8,

    // -- runtime state --
    pub client_state: ClientState,
    pub last_contact: u64,
    pub last_cred_update: u64,
    pub last_access_update: u64,
    pub initial_conn_time: u64,
    pub last_req_time: u64,
    pub req_retry_interval: Duration,
    pub req_attempts: u32,
    pub pid: u32,
}

impl Client {
    /// Build a fresh `Client` context from a parsed config. Runtime state
    /// starts zeroed; the control loop stamps timers after a successful
    /// connect.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ctrl_addr: config.ctrl_addr.clone(),
            ctrl_port: config.ctrl_port,
            client_id: config.ctrl_stanza.clone().unwrap_or_default(),
            cert_file: config.cert_file.clone(),
            key_file: config.key_file.clone(),
            client_config_file: config.client_config_file.clone(),
            fwknop_config_file: config.fwknop_config_file.clone(),
            pid_file: config.pid_file.clone(),
            spa_encryption_key: config.spa_encryption_key.clone(),
            spa_hmac_key: config.spa_hmac_key.clone(),

            cred_update_interval: config.cred_update_interval,
            access_update_interval: config.access_update_interval,
            keep_alive_interval: config.keep_alive_interval,
            initial_req_retry_interval: config.initial_request_retry_interval,
            max_req_attempts: config.max_request_attempts,
            initial_conn_retry_interval: config.init_conn_retry_interval,
            max_conn_attempts: config.max_conn_attempts,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            msg_q_len: config.msg_q_len,
            post_spa_delay: config.post_spa_delay,

            foreground: config.foreground,
            remain_connected: config.remain_connected,
            use_spa: config.use_spa,
            use_syslog: config.use_syslog,
            verbosity: config.verbosity,

            client_state: ClientState::Ready,
            last_contact: 0,
            last_cred_update: 0,
            last_access_update: 0,
            initial_conn_time: 0,
            last_req_time: 0,
            req_retry_interval: config.initial_request_retry_interval,
            req_attempts: 0,
            pid: std::process::id(),
        }
    }

    /// Re-initialize in place from a freshly re-read config, preserving
    /// nothing: the `HUP`/restart path destroys all prior in-memory state
    /// before re-reading, rather than merging the new config into the old.
    pub fn reinit(&mut self, config: &Config) {
        *self = Self::from_config(config);
    }

    /// Keep-alive is due when `now >= last_contact + keep_alive_interval`.
    pub fn keep_alive_due(&self, now: u64) -> bool {
        now >= self.last_contact + self.keep_alive_interval.as_secs()
    }

    /// Credential refresh is due when
    /// `now >= last_cred_update + cred_update_interval`.
    pub fn cred_update_due(&self, now: u64) -> bool {
        now >= self.last_cred_update + self.cred_update_interval.as_secs()
    }

    /// Access refresh is due when
    /// `now >= last_access_update + access_update_interval`.
    pub fn access_update_due(&self, now: u64) -> bool {
        now >= self.last_access_update + self.access_update_interval.as_secs()
    }

    /// Record the transmission of a request (first send or a retry):
    /// stamp `last_req_time` and increment `req_attempts`.
    pub fn record_request_sent(&mut self, now: u64) {
        self.last_req_time = now;
        self.req_attempts += 1;
    }

    /// Double the current retry interval.
    pub fn double_retry_interval(&mut self) {
        self.req_retry_interval *= 2;
    }

    /// Clear request-cycle variables on return to `Ready`. Also applied on a
    /// fresh reconnect, so that a newly-established connection starts
    /// equivalent to `Ready` and the first post-reconnect request is never
    /// counted against a prior cycle's attempts.
    pub fn clear_request_vars(&mut self) {
        self.req_attempts = 0;
        self.req_retry_interval = self.initial_req_retry_interval;
        self.client_state = ClientState::Ready;
    }

    /// `req_attempts >= max_req_attempts` at retry time.
    pub fn attempts_exhausted(&self) -> bool {
        self.req_attempts >= self.max_req_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_client() -> Client {
        Client::from_config(&Config::defaults())
    }

    #[test]
    fn fresh_client_starts_ready() {
        let client = test_client();
        assert_eq!(client.client_state, ClientState::Ready);
        assert_eq!(client.req_attempts, 0);
    }

    #[test]
    fn client_id_comes_from_ctrl_stanza_not_ctrl_addr() {
        let mut config = Config::defaults();
        config.ctrl_addr = "ctrl.example.com".to_string();
        config.ctrl_stanza = Some("office-laptop".to_string());

        let client = Client::from_config(&config);
        assert_eq!(client.client_id, "office-laptop");
        assert_ne!(client.client_id, client.ctrl_addr);
    }

    #[test]
    fn client_id_defaults_to_empty_without_ctrl_stanza() {
        let client = test_client();
        assert_eq!(client.client_id, "");
    }

    #[test]
    fn keep_alive_due_predicate() {
        let mut client = test_client();
        client.keep_alive_interval = Duration::from_secs(60);
        client.last_contact = 100;
        assert!(!client.keep_alive_due(159));
        assert!(client.keep_alive_due(160));
        assert!(client.keep_alive_due(161));
    }

    #[test]
    fn backoff_doubles_and_resets() {
        let mut client = test_client();
        client.initial_req_retry_interval = Duration::from_secs(10);
        client.req_retry_interval = Duration::from_secs(10);

        client.double_retry_interval();
        assert_eq!(client.req_retry_interval, Duration::from_secs(20));
        client.double_retry_interval();
        assert_eq!(client.req_retry_interval, Duration::from_secs(40));

        client.clear_request_vars();
        assert_eq!(client.req_retry_interval, Duration::from_secs(10));
        assert_eq!(client.req_attempts, 0);
    }

    #[test]
    fn attempts_cap() {
        let mut client = test_client();
        client.max_req_attempts = 3;
        client.req_attempts = 2;
        assert!(!client.attempts_exhausted());
        client.req_attempts = 3;
        assert!(client.attempts_exhausted());
    }

    #[test]
    fn reinit_replaces_all_runtime_state() {
        let mut client = test_client();
        client.client_state = ClientState::CredRequesting;
        client.req_attempts = 7;
        client.last_contact = 12345;

        client.reinit(&Config::defaults());

        assert_eq!(client.client_state, ClientState::Ready);
        assert_eq!(client.req_attempts, 0);
        assert_eq!(client.last_contact, 0);
    }
}
