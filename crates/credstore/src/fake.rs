// SPDX-License-Identifier: MIT

//! An in-memory `CredStoreWriter` for rotation-algorithm tests — no real
//! disk, and error injection per path so a test can force the rollback
//! path deterministically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::{CredStoreError, CredStoreWriter};

#[derive(Default)]
struct State {
    files: HashMap<PathBuf, String>,
    fail_writes: std::collections::HashSet<PathBuf>,
}

pub struct FakeCredStoreWriter {
    state: Mutex<State>,
}

impl FakeCredStoreWriter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn seed(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.state.lock().files.insert(path.into(), contents.into());
    }

    pub fn contents(&self, path: impl Into<PathBuf>) -> String {
        let path = path.into();
        self.state
            .lock()
            .files
            .get(&path)
            .cloned()
            .unwrap_or_default()
    }

    /// The write to `path` (the final rename step) will fail once.
    pub fn fail_write(&self, path: impl Into<PathBuf>) {
        self.state.lock().fail_writes.insert(path.into());
    }
}

impl Default for FakeCredStoreWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn err(path: &Path, msg: &str) -> CredStoreError {
    CredStoreError::io(path, std::io::Error::new(std::io::ErrorKind::Other, msg.to_string()))
}

impl CredStoreWriter for FakeCredStoreWriter {
    fn exists(&self, path: &Path) -> bool {
        self.state.lock().files.contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, CredStoreError> {
        Ok(self.state.lock().files.get(path).cloned().unwrap_or_default())
    }

    fn backup(&self, path: &Path) -> Result<PathBuf, CredStoreError> {
        let backup_path = path.with_extension("rotate-bak");
        let contents = self
            .state
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| err(path, "backup source missing"))?;
        self.state.lock().files.insert(backup_path.clone(), contents);
        Ok(backup_path)
    }

    fn restore(&self, backup: &Path, original: &Path) -> Result<(), CredStoreError> {
        let contents = self
            .state
            .lock()
            .files
            .remove(backup)
            .ok_or_else(|| err(backup, "restore source missing"))?;
        self.state.lock().files.insert(original.to_path_buf(), contents);
        Ok(())
    }

    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CredStoreError> {
        let text = String::from_utf8_lossy(data).to_string();
        self.state.lock().files.insert(path.to_path_buf(), text);
        Ok(())
    }

    fn fsync_file(&self, _path: &Path) -> Result<(), CredStoreError> {
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), CredStoreError> {
        if self.state.lock().fail_writes.contains(to) {
            return Err(err(to, "injected rename failure"));
        }
        let contents = self
            .state
            .lock()
            .files
            .remove(from)
            .ok_or_else(|| err(from, "rename source missing"))?;
        self.state.lock().files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn fsync_dir(&self, _path: &Path) -> Result<(), CredStoreError> {
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), CredStoreError> {
        self.state.lock().files.remove(path);
        Ok(())
    }
}
