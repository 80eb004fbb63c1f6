// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! sdpc-credstore: atomic credential rotation.
//!
//! A rotated bundle touches four files — the TLS client certificate, its
//! private key, and the SPA key stanzas embedded in two separate
//! config files consumed by other collaborators (the client's own config
//! and the `fwknop` config it shares with the SPA sender). These four
//! writes happen as one transaction: cert, then key, then client-config
//! stanza, then fwknop-config stanza, each backed up before being
//! overwritten, with a failure at any step rolling every already-committed
//! file back to its backup in reverse order. Only after all four writes
//! succeed does the caller update the in-memory SPA keys held by the
//! transport facade.
//!
//! A `CredStoreWriter` trait abstracts the filesystem (write-to-tmp, fsync,
//! atomic rename, fsync directory) so the rotation algorithm itself is
//! testable without a real disk.

mod stanza;
mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use stanza::{
    update_spa_stanza, CLIENT_ENCRYPTION_KEY_SETTING, CLIENT_HMAC_KEY_SETTING,
    FWKNOP_ENCRYPTION_KEY_SETTING, FWKNOP_HMAC_KEY_SETTING,
};
pub use writer::{CredStoreWriter, FsCredStoreWriter};

use std::path::PathBuf;

use sdpc_codec::CredentialBundle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rotation failed at step {failed_step} and rollback of step {rollback_step} also failed: {source}")]
    RollbackFailed {
        failed_step: &'static str,
        rollback_step: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CredStoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        CredStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The four file paths a rotation touches.
#[derive(Debug, Clone)]
pub struct CredStorePaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub client_config_path: PathBuf,
    pub fwknop_config_path: PathBuf,
}

/// One rotation step: which file, and the bytes it should hold afterward.
struct Step<'a> {
    name: &'static str,
    path: &'a std::path::Path,
    contents: Vec<u8>,
}

/// Apply a rotated credential bundle across all four files, atomically.
///
/// On any step's failure, every step committed so far is restored from its
/// backup, in reverse order, before the error is returned. A failure during
/// rollback itself is reported via `RollbackFailed` rather than silently
/// leaving a partially rolled-back transaction.
pub fn apply_rotation<W: CredStoreWriter>(
    writer: &W,
    paths: &CredStorePaths,
    bundle: &CredentialBundle,
) -> Result<(), CredStoreError> {
    let client_stanza = stanza::update_spa_stanza(
        &read_existing(writer, &paths.client_config_path)?,
        bundle,
        stanza::CLIENT_ENCRYPTION_KEY_SETTING,
        stanza::CLIENT_HMAC_KEY_SETTING,
    );
    let fwknop_stanza = stanza::update_spa_stanza(
        &read_existing(writer, &paths.fwknop_config_path)?,
        bundle,
        stanza::FWKNOP_ENCRYPTION_KEY_SETTING,
        stanza::FWKNOP_HMAC_KEY_SETTING,
    );

    let steps = [
        Step {
            name: "cert",
            path: &paths.cert_path,
            contents: bundle.cert_pem.clone().into_bytes(),
        },
        Step {
            name: "key",
            path: &paths.key_path,
            contents: bundle.key_pem.clone().into_bytes(),
        },
        Step {
            name: "client_config",
            path: &paths.client_config_path,
            contents: client_stanza.into_bytes(),
        },
        Step {
            name: "fwknop_config",
            path: &paths.fwknop_config_path,
            contents: fwknop_stanza.into_bytes(),
        },
    ];

    let mut committed: Vec<(&'static str, &std::path::Path, Option<PathBuf>)> = Vec::new();

    for step in &steps {
        match commit_step(writer, step) {
            Ok(backup) => committed.push((step.name, step.path, backup)),
            Err(e) => {
                rollback(writer, &committed, step.name)?;
                return Err(e);
            }
        }
    }

    for (name, _, backup) in &committed {
        if let Some(backup_path) = backup {
            if let Err(e) = writer.remove(backup_path) {
                tracing::warn!(step = name, error = %e, "failed to clean up rotation backup");
            }
        }
    }

    Ok(())
}

fn read_existing<W: CredStoreWriter>(
    writer: &W,
    path: &std::path::Path,
) -> Result<String, CredStoreError> {
    let _ = sdpc_core::permissions::verify_permissions(path);
    writer.read_to_string(path)
}

/// Write one step's contents, backing up whatever was there first. Returns
/// the backup path, or `None` if the file didn't previously exist (nothing
/// to roll back to but deletion).
fn commit_step<W: CredStoreWriter>(
    writer: &W,
    step: &Step<'_>,
) -> Result<Option<PathBuf>, CredStoreError> {
    let _ = sdpc_core::permissions::verify_permissions(step.path);

    let backup = if writer.exists(step.path) {
        Some(writer.backup(step.path)?)
    } else {
        None
    };

    let tmp_path = step.path.with_extension("rotate-tmp");
    writer.write_tmp(&tmp_path, &step.contents)?;
    writer.fsync_file(&tmp_path)?;
    writer.rename(&tmp_path, step.path)?;
    if let Some(parent) = step.path.parent() {
        writer.fsync_dir(parent)?;
    }

    Ok(backup)
}

/// Restore every already-committed step, in reverse order. `failed_step`
/// names the step whose write caused the rollback, for the error message
/// if a restore itself fails.
fn rollback<W: CredStoreWriter>(
    writer: &W,
    committed: &[(&'static str, &std::path::Path, Option<PathBuf>)],
    failed_step: &'static str,
) -> Result<(), CredStoreError> {
    for (name, path, backup) in committed.iter().rev() {
        let result = match backup {
            Some(backup_path) => writer.restore(backup_path, path),
            None => writer.remove(path),
        };
        if let Err(source) = result {
            return Err(CredStoreError::RollbackFailed {
                failed_step,
                rollback_step: name,
                source,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeCredStoreWriter;
    use sdpc_core::bytes::SecretBytes;

    fn bundle() -> CredentialBundle {
        CredentialBundle {
            cert_pem: "NEW-CERT".to_string(),
            key_pem: "NEW-KEY".to_string(),
            spa_encryption_key: SecretBytes::new(vec![1, 2, 3]).unwrap(),
            spa_hmac_key: SecretBytes::new(vec![4, 5, 6]).unwrap(),
        }
    }

    fn paths() -> CredStorePaths {
        CredStorePaths {
            cert_path: PathBuf::from("/creds/cert.pem"),
            key_path: PathBuf::from("/creds/key.pem"),
            client_config_path: PathBuf::from("/etc/client.conf"),
            fwknop_config_path: PathBuf::from("/etc/fwknop.conf"),
        }
    }

    #[test]
    fn successful_rotation_writes_all_four_files() {
        let writer = FakeCredStoreWriter::new();
        writer.seed("/creds/cert.pem", "OLD-CERT");
        writer.seed("/creds/key.pem", "OLD-KEY");
        writer.seed("/etc/client.conf", "OTHER_SETTING yes\n");
        writer.seed("/etc/fwknop.conf", "OTHER_SETTING yes\n");

        apply_rotation(&writer, &paths(), &bundle()).unwrap();

        assert_eq!(writer.contents("/creds/cert.pem"), "NEW-CERT");
        assert_eq!(writer.contents("/creds/key.pem"), "NEW-KEY");
        assert!(writer.contents("/etc/client.conf").contains("OTHER_SETTING yes"));
        assert!(writer.contents("/etc/client.conf").contains("SPA_ENCRYPTION_KEY"));
        assert!(writer.contents("/etc/client.conf").contains("SPA_HMAC_KEY"));
        // The client config file is read by `sdpc-core::config::Config::load`
        // on reload (HUP or restart), which only recognizes these two names —
        // not fwknop's own `KEY_BASE64`/`HMAC_KEY_BASE64` convention.
        assert!(!writer.contents("/etc/client.conf").contains("KEY_BASE64"));
        assert!(writer.contents("/etc/fwknop.conf").contains("KEY_BASE64"));
        assert!(writer.contents("/etc/fwknop.conf").contains("HMAC_KEY_BASE64"));
    }

    #[test]
    fn failure_on_third_step_rolls_back_first_two() {
        let writer = FakeCredStoreWriter::new();
        writer.seed("/creds/cert.pem", "OLD-CERT");
        writer.seed("/creds/key.pem", "OLD-KEY");
        writer.seed("/etc/client.conf", "OTHER_SETTING yes\n");
        writer.seed("/etc/fwknop.conf", "OTHER_SETTING yes\n");
        writer.fail_write("/etc/client.conf");

        let err = apply_rotation(&writer, &paths(), &bundle());
        assert!(err.is_err());

        assert_eq!(writer.contents("/creds/cert.pem"), "OLD-CERT");
        assert_eq!(writer.contents("/creds/key.pem"), "OLD-KEY");
    }

    /// Seed all four pre-rotation contents, used by each single-step-failure
    /// test below so every rollback assertion has a known "prior state" to
    /// compare the post-failure contents against.
    fn seed_all(writer: &FakeCredStoreWriter) {
        writer.seed("/creds/cert.pem", "OLD-CERT");
        writer.seed("/creds/key.pem", "OLD-KEY");
        writer.seed("/etc/client.conf", "OTHER_SETTING yes\n");
        writer.seed("/etc/fwknop.conf", "OTHER_SETTING yes\n");
    }

    fn assert_all_four_files_are_unchanged(writer: &FakeCredStoreWriter) {
        assert_eq!(writer.contents("/creds/cert.pem"), "OLD-CERT");
        assert_eq!(writer.contents("/creds/key.pem"), "OLD-KEY");
        assert_eq!(writer.contents("/etc/client.conf"), "OTHER_SETTING yes\n");
        assert_eq!(writer.contents("/etc/fwknop.conf"), "OTHER_SETTING yes\n");
    }

    #[test]
    fn failure_on_first_step_cert_leaves_all_four_files_untouched() {
        let writer = FakeCredStoreWriter::new();
        seed_all(&writer);
        writer.fail_write("/creds/cert.pem");

        let err = apply_rotation(&writer, &paths(), &bundle());
        assert!(err.is_err());

        assert_all_four_files_are_unchanged(&writer);
    }

    #[test]
    fn failure_on_second_step_key_rolls_back_the_cert_write() {
        let writer = FakeCredStoreWriter::new();
        seed_all(&writer);
        writer.fail_write("/creds/key.pem");

        let err = apply_rotation(&writer, &paths(), &bundle());
        assert!(err.is_err());

        assert_all_four_files_are_unchanged(&writer);
    }

    /// Spec's testable property #4 and the concrete "S4 atomic rollback"
    /// scenario both name the fourth/last step (fwknop config) explicitly:
    /// cert, key, and the client config file must equal their pre-call
    /// bytes when the final write fails.
    #[test]
    fn failure_on_fourth_step_fwknop_config_rolls_back_the_first_three() {
        let writer = FakeCredStoreWriter::new();
        seed_all(&writer);
        writer.fail_write("/etc/fwknop.conf");

        let err = apply_rotation(&writer, &paths(), &bundle());
        assert!(err.is_err());

        assert_all_four_files_are_unchanged(&writer);
    }

    #[test]
    fn first_rotation_with_no_prior_files_has_nothing_to_back_up() {
        let writer = FakeCredStoreWriter::new();
        apply_rotation(&writer, &paths(), &bundle()).unwrap();
        assert_eq!(writer.contents("/creds/cert.pem"), "NEW-CERT");
    }
}
