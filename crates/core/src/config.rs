// SPDX-License-Identifier: MIT

//! Configuration-file parsing.
//!
//! The wire format is line-oriented: `KEY VALUE`, blank lines and `#`
//! comments ignored, one setting per line, lines capped at 1024 characters —
//! the same shape the SDP client's rc file has always used, rather than
//! pulling in a TOML/YAML parser the protocol never spoke.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::bytes::SecretBytes;

/// Config line length cap.
pub const MAX_CONFIG_LINE_LEN: usize = 1024;
/// Server address string cap.
pub const MAX_SERVER_STR_LEN: usize = 50;

const DEFAULT_MSG_Q_LEN: usize = 10;
const MAX_MSG_Q_LEN: usize = 100;
const DEFAULT_POST_SPA_DELAY: Duration = Duration::new(0, 500_000_000);
const MAX_POST_SPA_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config line {line_no} in {path} exceeds {MAX_CONFIG_LINE_LEN} characters")]
    LineTooLong { path: PathBuf, line_no: usize },

    #[error("CTRL_ADDR exceeds {MAX_SERVER_STR_LEN} characters")]
    ServerStringTooLong,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("invalid key material for {key}: {source}")]
    KeyMaterial {
        key: String,
        #[source]
        source: crate::bytes::KeyTooLong,
    },
}

/// Parsed, typed configuration. Every field has a hardcoded default;
/// `Config::load` applies recognized keys over these defaults and enforces
/// the stated caps.
#[derive(Debug, Clone)]
pub struct Config {
    pub ctrl_addr: String,
    pub ctrl_port: u16,
    pub ctrl_stanza: Option<String>,
    pub use_spa: bool,
    pub remain_connected: bool,
    pub foreground: bool,
    pub use_syslog: bool,
    pub verbosity: u8,
    pub key_file: PathBuf,
    pub cert_file: PathBuf,
    pub spa_encryption_key: SecretBytes,
    pub spa_hmac_key: SecretBytes,
    pub msg_q_len: usize,
    pub post_spa_delay: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub cred_update_interval: Duration,
    pub access_update_interval: Duration,
    pub max_conn_attempts: u32,
    pub init_conn_retry_interval: Duration,
    pub keep_alive_interval: Duration,
    pub max_request_attempts: u32,
    pub initial_request_retry_interval: Duration,
    pub pid_file: PathBuf,

    /// The files the credential store rewrites on rotation: the config
    /// file this value was itself loaded from (its SPA-key stanza is
    /// rewritten in place), and the separate fwknop config file.
    pub client_config_file: PathBuf,
    pub fwknop_config_file: PathBuf,
}

impl Config {
    /// Hardcoded defaults, used before any config file is read and as the
    /// base every recognized key is applied over.
    #[allow(clippy::expect_used)]
    pub fn defaults() -> Self {
        Self {
            ctrl_addr: String::new(),
            ctrl_port: 0,
            ctrl_stanza: None,
            use_spa: false,
            remain_connected: false,
            foreground: true,
            use_syslog: false,
            verbosity: 0,
            key_file: PathBuf::new(),
            cert_file: PathBuf::new(),
            spa_encryption_key: SecretBytes::new(Vec::new()).expect("empty key is within limit"),
            spa_hmac_key: SecretBytes::new(Vec::new()).expect("empty key is within limit"),
            msg_q_len: DEFAULT_MSG_Q_LEN,
            post_spa_delay: DEFAULT_POST_SPA_DELAY,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
            cred_update_interval: Duration::from_secs(7200),
            access_update_interval: Duration::from_secs(86400),
            max_conn_attempts: 3,
            init_conn_retry_interval: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(60),
            max_request_attempts: 3,
            initial_request_retry_interval: Duration::from_secs(10),
            pid_file: PathBuf::from("sdpc-agentd.pid"),
            client_config_file: PathBuf::new(),
            fwknop_config_file: PathBuf::from("/etc/fwknop/fwknop.conf"),
        }
    }

    /// Load configuration from `path`, applying recognized `KEY VALUE` lines
    /// over the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::defaults();
        config.client_config_file = path.to_path_buf();

        for (line_no, raw_line) in text.lines().enumerate() {
            if raw_line.len() > MAX_CONFIG_LINE_LEN {
                return Err(ConfigError::LineTooLong {
                    path: path.to_path_buf(),
                    line_no: line_no + 1,
                });
            }

            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            apply_setting(&mut config, key.trim(), value.trim())?;
        }

        if config.ctrl_addr.len() > MAX_SERVER_STR_LEN {
            return Err(ConfigError::ServerStringTooLong);
        }

        Ok(config)
    }
}

fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |key: &str, value: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };

    match key {
        "CTRL_ADDR" => config.ctrl_addr = value.to_string(),
        "CTRL_PORT" => {
            config.ctrl_port = value.parse().map_err(|_| invalid(key, value))?;
        }
        "CTRL_STANZA" => config.ctrl_stanza = Some(value.to_string()),
        "USE_SPA" => config.use_spa = parse_bool(key, value)?,
        "REMAIN_CONNECTED" => config.remain_connected = parse_bool(key, value)?,
        "FOREGROUND" => config.foreground = parse_bool(key, value)?,
        "USE_SYSLOG" => config.use_syslog = parse_bool(key, value)?,
        "VERBOSITY" => {
            config.verbosity = value.parse().map_err(|_| invalid(key, value))?;
        }
        "KEY_FILE" => config.key_file = PathBuf::from(value),
        "CERT_FILE" => config.cert_file = PathBuf::from(value),
        "SPA_ENCRYPTION_KEY" => {
            config.spa_encryption_key = decode_key(key, value)?;
        }
        "SPA_HMAC_KEY" => {
            config.spa_hmac_key = decode_key(key, value)?;
        }
        "MSG_Q_LEN" => {
            let len: usize = value.parse().map_err(|_| invalid(key, value))?;
            config.msg_q_len = len.min(MAX_MSG_Q_LEN);
        }
        "POST_SPA_DELAY" => {
            let secs: f64 = value.parse().map_err(|_| invalid(key, value))?;
            let requested = Duration::from_secs_f64(secs.max(0.0));
            config.post_spa_delay = requested.min(MAX_POST_SPA_DELAY);
        }
        "READ_TIMEOUT" => config.read_timeout = parse_secs(key, value)?,
        "WRITE_TIMEOUT" => config.write_timeout = parse_secs(key, value)?,
        "CRED_UPDATE_INTERVAL" => config.cred_update_interval = parse_secs(key, value)?,
        "ACCESS_UPDATE_INTERVAL" => config.access_update_interval = parse_secs(key, value)?,
        "MAX_CONN_ATTEMPTS" => {
            config.max_conn_attempts = value.parse().map_err(|_| invalid(key, value))?;
        }
        "INIT_CONN_RETRY_INTERVAL" => {
            config.init_conn_retry_interval = parse_secs(key, value)?;
        }
        "KEEP_ALIVE_INTERVAL" => config.keep_alive_interval = parse_secs(key, value)?,
        "MAX_REQUEST_ATTEMPTS" => {
            config.max_request_attempts = value.parse().map_err(|_| invalid(key, value))?;
        }
        "INIT_REQUEST_RETRY_INTERVAL" => {
            config.initial_request_retry_interval = parse_secs(key, value)?;
        }
        "PID_FILE" => config.pid_file = PathBuf::from(value),
        "FWKNOP_CONFIG_FILE" => config.fwknop_config_file = PathBuf::from(value),
        // Unknown keys are ignored rather than rejected: the format is
        // forward-compatible the same way the codec's inbound classifier
        // drops unrecognized-but-well-formed subjects instead of erroring.
        _ => {}
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    Ok(Duration::from_secs(secs))
}

fn decode_key(key: &str, value: &str) -> Result<SecretBytes, ConfigError> {
    use base64::Engine;
    let raw = base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })?;
    SecretBytes::new(raw).map_err(|source| ConfigError::KeyMaterial {
        key: key.to_string(),
        source,
    })
}
