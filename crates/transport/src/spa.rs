// SPDX-License-Identifier: MIT

//! Single Packet Authorization. A narrow, concrete implementation: one UDP
//! datagram containing a random nonce, a timestamp, an AES-256-GCM
//! encrypted payload, and an HMAC-SHA256 tag over the encrypted packet.
//!
//! This is not a protocol this crate invents — it mirrors the shape fwknop
//! and similar SPA implementations use (encrypt-then-MAC over a nonce +
//! timestamp + client identity payload) closely enough to exercise real
//! `aes-gcm`/`hmac`/`sha2` usage, while staying out of the control loop's
//! way: `send_spa` is fire-and-forget from the loop's perspective.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;

use sdpc_core::bytes::SecretBytes;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Build and send one SPA packet to `spa_addr`, identifying this client as
/// `client_id`. Errors are I/O only; malformed key material is rejected
/// earlier, at credential-store load time.
pub async fn send_spa(
    spa_addr: SocketAddr,
    client_id: &str,
    encryption_key: &SecretBytes,
    hmac_key: &SecretBytes,
) -> std::io::Result<()> {
    let packet = build_packet(client_id, encryption_key, hmac_key)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    #[allow(clippy::expect_used)]
    let local: SocketAddr = if spa_addr.is_ipv6() {
        "[::]:0".parse().expect("constant local ipv6 bind addr is valid")
    } else {
        "0.0.0.0:0".parse().expect("constant local ipv4 bind addr is valid")
    };
    let socket = UdpSocket::bind(local).await?;
    socket.send_to(&packet, spa_addr).await?;
    Ok(())
}

fn build_packet(
    client_id: &str,
    encryption_key: &SecretBytes,
    hmac_key: &SecretBytes,
) -> Result<Vec<u8>, String> {
    let cipher_key = derive_key(encryption_key.as_bytes());
    let cipher = Aes256Gcm::new_from_slice(&cipher_key).map_err(|e| e.to_string())?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let plaintext = format!("{timestamp}:{client_id}");
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| e.to_string())?;

    let mut packet = Vec::with_capacity(NONCE_LEN + ciphertext.len() + 32);
    packet.extend_from_slice(&nonce_bytes);
    packet.extend_from_slice(&ciphertext);

    let mut mac = HmacSha256::new_from_slice(hmac_key.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(&packet);
    let tag = mac.finalize().into_bytes();
    packet.extend_from_slice(&tag);

    Ok(packet)
}

/// Keys arriving from a controller are arbitrary-length (up to the 128-byte
/// cap in `sdpc_core::bytes`); AES-256-GCM needs exactly 32 bytes, so derive
/// a fixed-size key via SHA-256 rather than truncating or padding.
fn derive_key(raw: &[u8]) -> [u8; 32] {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hasher.finalize().into()
}
