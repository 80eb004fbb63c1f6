// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! sdpc-codec: the JSON message codec — builds outbound
//! keep-alive/credential-update envelopes and classifies inbound envelopes
//! into a result tag plus an optional credential bundle.
//!
//! Wire format: one JSON object per message, handed to the transport
//! facade's `send_msg`/`get_msg` as a single framed unit. Framing itself is
//! the transport's concern, not the codec's.

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sdpc_core::bytes::SecretBytes;

/// Outbound request subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    KeepAlive,
    CredUpdate,
}

/// Outbound credential-update stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Requesting,
    Fulfilled,
}

/// A credential bundle: produced by the codec when a credential update
/// arrives, consumed exactly once by the credential store.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub cert_pem: String,
    pub key_pem: String,
    pub spa_encryption_key: SecretBytes,
    pub spa_hmac_key: SecretBytes,
}

/// An inbound message result. Unknown well-formed subjects classify as
/// `BadResult` rather than erroring — the loop logs and drops them, it
/// never crashes on a result tag it doesn't recognize.
#[derive(Debug)]
pub enum InboundResult {
    KeepAliveFulfilling,
    CredsFulfilling(CredentialBundle),
    BadResult,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("credential bundle had invalid key material: {0}")]
    BadKeyMaterial(#[from] sdpc_core::bytes::KeyTooLong),

    #[error("credential bundle had invalid base64 key encoding")]
    BadKeyEncoding,
}

#[derive(Serialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
enum OutboundWire {
    KeepAlive,
    CredUpdate { stage: &'static str },
}

/// Build an outbound envelope.
pub fn make(subject: Subject, stage: Option<Stage>) -> String {
    let wire = match subject {
        Subject::KeepAlive => OutboundWire::KeepAlive,
        Subject::CredUpdate => OutboundWire::CredUpdate {
            stage: match stage {
                Some(Stage::Requesting) | None => "requesting",
                Some(Stage::Fulfilled) => "fulfilled",
            },
        },
    };
    // A `String`-producing serialization of a fixed, small enum cannot fail.
    serde_json::to_string(&wire).unwrap_or_default()
}

#[derive(Deserialize)]
struct WireCredentialBundle {
    cert_pem: String,
    key_pem: String,
    spa_encryption_key: String,
    spa_hmac_key: String,
}

#[derive(Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum InboundWire {
    KeepAliveFulfilling,
    CredsFulfilling { bundle: WireCredentialBundle },
    #[serde(other)]
    Unknown,
}

/// Classify an inbound envelope. Malformed JSON is an error returned to the
/// loop; a well-formed but unrecognized `result` tag yields `BadResult` so
/// future server-added tags degrade gracefully instead of crashing the
/// client.
pub fn process(text: &str) -> Result<InboundResult, CodecError> {
    let wire: InboundWire = serde_json::from_str(text)?;
    match wire {
        InboundWire::KeepAliveFulfilling => Ok(InboundResult::KeepAliveFulfilling),
        InboundWire::CredsFulfilling { bundle } => {
            let spa_encryption_key = decode_key(&bundle.spa_encryption_key)?;
            let spa_hmac_key = decode_key(&bundle.spa_hmac_key)?;
            Ok(InboundResult::CredsFulfilling(CredentialBundle {
                cert_pem: bundle.cert_pem,
                key_pem: bundle.key_pem,
                spa_encryption_key,
                spa_hmac_key,
            }))
        }
        InboundWire::Unknown => Ok(InboundResult::BadResult),
    }
}

fn decode_key(b64: &str) -> Result<SecretBytes, CodecError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|_| CodecError::BadKeyEncoding)?;
    Ok(SecretBytes::new(raw)?)
}

/// Encode a credential bundle for test fixtures / fakes that simulate a
/// controller's `creds_fulfilling` reply.
pub fn encode_creds_fulfilling(bundle: &CredentialBundle) -> String {
    let wire = serde_json::json!({
        "result": "creds_fulfilling",
        "bundle": {
            "cert_pem": bundle.cert_pem,
            "key_pem": bundle.key_pem,
            "spa_encryption_key": base64::engine::general_purpose::STANDARD
                .encode(bundle.spa_encryption_key.as_bytes()),
            "spa_hmac_key": base64::engine::general_purpose::STANDARD
                .encode(bundle.spa_hmac_key.as_bytes()),
        }
    });
    wire.to_string()
}

/// Encode a `keep_alive_fulfilling` reply for test fixtures.
pub fn encode_keep_alive_fulfilling() -> String {
    serde_json::json!({ "result": "keep_alive_fulfilling" }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_keep_alive_has_no_stage() {
        let text = make(Subject::KeepAlive, None);
        assert_eq!(text, r#"{"subject":"keep_alive"}"#);
    }

    #[test]
    fn make_cred_update_requesting() {
        let text = make(Subject::CredUpdate, Some(Stage::Requesting));
        assert_eq!(text, r#"{"subject":"cred_update","stage":"requesting"}"#);
    }

    #[test]
    fn make_cred_update_fulfilled() {
        let text = make(Subject::CredUpdate, Some(Stage::Fulfilled));
        assert_eq!(text, r#"{"subject":"cred_update","stage":"fulfilled"}"#);
    }

    #[test]
    fn process_keep_alive_fulfilling() {
        let result = process(&encode_keep_alive_fulfilling()).unwrap();
        assert!(matches!(result, InboundResult::KeepAliveFulfilling));
    }

    #[test]
    fn process_creds_fulfilling_roundtrips_bundle() {
        let bundle = CredentialBundle {
            cert_pem: "CERT".to_string(),
            key_pem: "KEY".to_string(),
            spa_encryption_key: SecretBytes::new(vec![1, 2, 3]).unwrap(),
            spa_hmac_key: SecretBytes::new(vec![4, 5, 6]).unwrap(),
        };
        let text = encode_creds_fulfilling(&bundle);
        match process(&text).unwrap() {
            InboundResult::CredsFulfilling(decoded) => {
                assert_eq!(decoded.cert_pem, "CERT");
                assert_eq!(decoded.key_pem, "KEY");
                assert_eq!(decoded.spa_encryption_key.as_bytes(), &[1, 2, 3]);
                assert_eq!(decoded.spa_hmac_key.as_bytes(), &[4, 5, 6]);
            }
            _ => panic!("expected CredsFulfilling"),
        }
    }

    #[test]
    fn unknown_well_formed_subject_is_bad_result_not_error() {
        let result = process(r#"{"result":"something_new"}"#).unwrap();
        assert!(matches!(result, InboundResult::BadResult));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = process("not json");
        assert!(err.is_err());
    }
}
