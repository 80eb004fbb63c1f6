// SPDX-License-Identifier: MIT

//! Opaque byte-string types for SPA key material.
//!
//! A raw key is at most 128 bytes, its base64 encoding at most 180
//! characters. `SecretBytes` enforces the raw cap at construction and
//! zeroizes its backing buffer on drop so rotated-out keys don't linger in
//! freed heap memory.

use std::fmt;
use zeroize::Zeroize;

/// Maximum length, in bytes, of a raw SPA key.
pub const MAX_RAW_KEY_LEN: usize = 128;

/// Maximum length, in characters, of a base64-encoded SPA key.
pub const MAX_B64_KEY_LEN: usize = 180;

#[derive(Debug, thiserror::Error)]
#[error("key material exceeds {MAX_RAW_KEY_LEN}-byte limit ({len} bytes)")]
pub struct KeyTooLong {
    len: usize,
}

/// A byte string holding key material (SPA encryption/HMAC keys). Zeroized
/// on drop; never printed via `Debug`/`Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Result<Self, KeyTooLong> {
        if bytes.len() > MAX_RAW_KEY_LEN {
            return Err(KeyTooLong { len: bytes.len() });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes({} bytes, redacted)", self.0.len())
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
