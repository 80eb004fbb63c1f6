// SPDX-License-Identifier: MIT

//! Verifying that a PID file or credential file is safe to trust before
//! reading it. Shared by `sdpc-daemon::pidfile` (the PID file itself) and
//! `sdpc-credstore` (the cert/key/config files a rotation reads before
//! rewriting), since both crates depend on `sdpc-core` but neither depends
//! on the other.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::error::CoreError;

/// `stat` the file and verify it is a regular file, mode exactly `0600`,
/// and owned by the current user. A missing file is acceptable — there's
/// nothing to mistrust yet. A mode or ownership mismatch is logged as an
/// error but is not itself fatal; callers keep their own fallback rule
/// for an untrustworthy file.
pub fn verify_permissions(path: &Path) -> Result<(), CoreError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CoreError::fs(path, e)),
    };

    if !metadata.is_file() {
        tracing::error!(path = %path.display(), "pid/credential file is not a regular file");
        return Ok(());
    }

    let mode = metadata.permissions().mode() & 0o777;
    if mode != 0o600 {
        tracing::error!(path = %path.display(), mode = format!("{mode:o}"), "unexpected file mode, expected 0600");
    }

    if let Some(our_uid) = current_uid() {
        let file_uid = metadata.uid();
        if file_uid != our_uid {
            tracing::error!(path = %path.display(), file_uid, our_uid, "file not owned by the current user");
        }
    }

    Ok(())
}

/// The process's own UID, read off `/proc/self`'s ownership rather than a
/// raw `geteuid()` call so this crate carries no unsafe code — `/proc/self`
/// is owned by the calling process's UID on Linux. Returns `None` (skipping
/// the ownership check) if `/proc` isn't mounted.
fn current_uid() -> Option<u32> {
    std::fs::metadata("/proc/self").ok().map(|m| m.uid())
}
