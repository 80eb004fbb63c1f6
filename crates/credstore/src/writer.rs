// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use crate::CredStoreError;

/// Abstracts every filesystem operation a credential rotation needs, so the
/// transaction/rollback algorithm in `apply_rotation` can be tested without
/// touching a real disk, by swapping in a fake implementation for tests.
pub trait CredStoreWriter: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String, CredStoreError>;
    fn backup(&self, path: &Path) -> Result<PathBuf, CredStoreError>;
    fn restore(&self, backup: &Path, original: &Path) -> Result<(), CredStoreError>;
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CredStoreError>;
    fn fsync_file(&self, path: &Path) -> Result<(), CredStoreError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), CredStoreError>;
    fn fsync_dir(&self, path: &Path) -> Result<(), CredStoreError>;
    fn remove(&self, path: &Path) -> Result<(), CredStoreError>;
}

/// Production writer using real filesystem operations.
#[derive(Debug, Clone, Default)]
pub struct FsCredStoreWriter;

impl CredStoreWriter for FsCredStoreWriter {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String, CredStoreError> {
        if !path.exists() {
            return Ok(String::new());
        }
        std::fs::read_to_string(path).map_err(|e| CredStoreError::io(path, e))
    }

    fn backup(&self, path: &Path) -> Result<PathBuf, CredStoreError> {
        let backup_path = path.with_extension("rotate-bak");
        std::fs::copy(path, &backup_path).map_err(|e| CredStoreError::io(path, e))?;
        Ok(backup_path)
    }

    fn restore(&self, backup: &Path, original: &Path) -> Result<(), CredStoreError> {
        std::fs::rename(backup, original).map_err(|e| CredStoreError::io(original, e))
    }

    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CredStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CredStoreError::io(path, e))?;
        }
        let mut file = File::create(path).map_err(|e| CredStoreError::io(path, e))?;
        file.write_all(data).map_err(|e| CredStoreError::io(path, e))?;
        Ok(())
    }

    fn fsync_file(&self, path: &Path) -> Result<(), CredStoreError> {
        let file = File::open(path).map_err(|e| CredStoreError::io(path, e))?;
        file.sync_all().map_err(|e| CredStoreError::io(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), CredStoreError> {
        std::fs::rename(from, to).map_err(|e| CredStoreError::io(to, e))
    }

    fn fsync_dir(&self, path: &Path) -> Result<(), CredStoreError> {
        let dir = File::open(path).map_err(|e| CredStoreError::io(path, e))?;
        dir.sync_all().map_err(|e| CredStoreError::io(path, e))
    }

    fn remove(&self, path: &Path) -> Result<(), CredStoreError> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_file(path).map_err(|e| CredStoreError::io(path, e))
    }
}
