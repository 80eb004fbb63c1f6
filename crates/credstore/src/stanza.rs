// SPDX-License-Identifier: MIT

//! Rewriting the SPA key lines embedded in a config file during rotation.
//!
//! The client's own config file and the `fwknop` config it shares with the
//! SPA sender both use the same `KEY value` line format, but they don't
//! agree on what the keys are called: `sdpc-core::config` only recognizes
//! `SPA_ENCRYPTION_KEY`/`SPA_HMAC_KEY` when it reloads the client config
//! file, while `fwknop`'s own config uses its native `KEY_BASE64`/
//! `HMAC_KEY_BASE64` convention. One rewrite routine serves both; callers
//! pick which setting names to rewrite.

use base64::Engine;

use sdpc_codec::CredentialBundle;

/// Setting names recognized by `sdpc-core::config::Config::load` when it
/// reloads the client's own config file — use these for `client_config_path`.
pub const CLIENT_ENCRYPTION_KEY_SETTING: &str = "SPA_ENCRYPTION_KEY";
pub const CLIENT_HMAC_KEY_SETTING: &str = "SPA_HMAC_KEY";

/// `fwknop`'s native setting names — use these for `fwknop_config_path`.
pub const FWKNOP_ENCRYPTION_KEY_SETTING: &str = "KEY_BASE64";
pub const FWKNOP_HMAC_KEY_SETTING: &str = "HMAC_KEY_BASE64";

/// Replace the `encryption_setting`/`hmac_setting` lines in `existing` with
/// the bundle's keys, preserving every other line untouched. Settings
/// absent from `existing` are appended rather than silently dropped, so a
/// first-ever rotation against a stanza-less file still lands both keys.
pub fn update_spa_stanza(
    existing: &str,
    bundle: &CredentialBundle,
    encryption_setting: &str,
    hmac_setting: &str,
) -> String {
    let encryption_b64 =
        base64::engine::general_purpose::STANDARD.encode(bundle.spa_encryption_key.as_bytes());
    let hmac_b64 = base64::engine::general_purpose::STANDARD.encode(bundle.spa_hmac_key.as_bytes());

    let mut saw_encryption = false;
    let mut saw_hmac = false;

    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if setting_name(trimmed) == Some(encryption_setting) {
                saw_encryption = true;
                format!("{encryption_setting} {encryption_b64}")
            } else if setting_name(trimmed) == Some(hmac_setting) {
                saw_hmac = true;
                format!("{hmac_setting} {hmac_b64}")
            } else {
                line.to_string()
            }
        })
        .collect();

    if !saw_encryption {
        lines.push(format!("{encryption_setting} {encryption_b64}"));
    }
    if !saw_hmac {
        lines.push(format!("{hmac_setting} {hmac_b64}"));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn setting_name(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    line.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdpc_core::bytes::SecretBytes;

    fn bundle() -> CredentialBundle {
        CredentialBundle {
            cert_pem: String::new(),
            key_pem: String::new(),
            spa_encryption_key: SecretBytes::new(vec![1, 2, 3]).unwrap(),
            spa_hmac_key: SecretBytes::new(vec![4, 5, 6]).unwrap(),
        }
    }

    #[test]
    fn replaces_existing_key_lines_in_place_for_fwknop_convention() {
        let existing = "OTHER_SETTING yes\nKEY_BASE64 old\nHMAC_KEY_BASE64 old\nTRAILING 1\n";
        let updated = update_spa_stanza(
            existing,
            &bundle(),
            FWKNOP_ENCRYPTION_KEY_SETTING,
            FWKNOP_HMAC_KEY_SETTING,
        );

        assert!(updated.contains("OTHER_SETTING yes"));
        assert!(updated.contains("TRAILING 1"));
        assert!(!updated.contains("KEY_BASE64 old"));
        assert!(updated.contains("KEY_BASE64 AQID"));
        assert!(updated.contains("HMAC_KEY_BASE64 BAUG"));
    }

    #[test]
    fn replaces_existing_key_lines_in_place_for_client_config_convention() {
        let existing = "OTHER_SETTING yes\nSPA_ENCRYPTION_KEY old\nSPA_HMAC_KEY old\nTRAILING 1\n";
        let updated = update_spa_stanza(
            existing,
            &bundle(),
            CLIENT_ENCRYPTION_KEY_SETTING,
            CLIENT_HMAC_KEY_SETTING,
        );

        assert!(updated.contains("OTHER_SETTING yes"));
        assert!(updated.contains("TRAILING 1"));
        assert!(!updated.contains("SPA_ENCRYPTION_KEY old"));
        assert!(updated.contains("SPA_ENCRYPTION_KEY AQID"));
        assert!(updated.contains("SPA_HMAC_KEY BAUG"));
        // Must not fall back to the fwknop-native names in the client config.
        assert!(!updated.contains("KEY_BASE64"));
    }

    #[test]
    fn appends_missing_settings_to_stanza_less_file() {
        let existing = "OTHER_SETTING yes\n";
        let updated = update_spa_stanza(
            existing,
            &bundle(),
            CLIENT_ENCRYPTION_KEY_SETTING,
            CLIENT_HMAC_KEY_SETTING,
        );

        assert!(updated.contains("OTHER_SETTING yes"));
        assert!(updated.contains("SPA_ENCRYPTION_KEY AQID"));
        assert!(updated.contains("SPA_HMAC_KEY BAUG"));
    }

    #[test]
    fn preserves_comments_and_blank_lines() {
        let existing = "# a comment\n\nSPA_ENCRYPTION_KEY old\n";
        let updated = update_spa_stanza(
            existing,
            &bundle(),
            CLIENT_ENCRYPTION_KEY_SETTING,
            CLIENT_HMAC_KEY_SETTING,
        );
        assert!(updated.contains("# a comment"));
    }
}
