//! File-backed session store
//!
//! The table lives in a single state file (see [`super::format`]). Writes go
//! to `<file>.tmp`, are fsynced, and are renamed over the state file, so the
//! state file always holds the last fully committed table.
//!
//! While open, the store holds an exclusive advisory lock on
//! `<file>.lock`. A second process opening the same path gets
//! [`StoreError::InUse`]. After [`SessionStore::close`] the lock is released
//! and writes fail with [`StoreError::Closed`]; reads still work.

use super::error::{StoreError, StoreResult};
use super::format;
use super::SessionStore;
use crate::file_storage::{
    atomic_write, ensure_dir, read_if_exists, remove_stale_temp, sibling_path,
};
use crate::models::{lock_count, SessionTable};
use crate::utils::lock_mutex_recover;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct FileStore {
    path: PathBuf,
    /// Held for the whole encode-and-rename sequence of a write
    write_lock: Mutex<()>,
    /// Ownership sidecar; None once closed
    owner: Mutex<Option<File>>,
}

impl FileStore {
    /// Open (or prepare) the state file at `path`
    ///
    /// Does not create the state file itself; a store that was never written
    /// reads as empty.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }

        let owner = acquire_owner_lock(&path)?;

        // A temp file can only be left by a write that never reached its rename.
        remove_stale_temp(&path)?;

        log::debug!("Opened session state file {:?}", path);
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            owner: Mutex::new(Some(owner)),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the ownership sidecar
    pub fn lock_path(&self) -> PathBuf {
        sibling_path(&self.path, ".lock")
    }
}

fn acquire_owner_lock(path: &Path) -> StoreResult<File> {
    let lock_path = sibling_path(path, ".lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| StoreError::io(format!("Failed to open lock file {:?}", lock_path), e))?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            log::warn!("Session state {:?} is already open in another process", path);
            Err(StoreError::InUse {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(StoreError::io(
            format!("Failed to lock {:?}", lock_path),
            e,
        )),
    }
}

impl SessionStore for FileStore {
    fn write(&self, table: &SessionTable) -> StoreResult<()> {
        let _guard = lock_mutex_recover(&self.write_lock);

        if lock_mutex_recover(&self.owner).is_none() {
            return Err(StoreError::Closed {
                path: self.path.clone(),
            });
        }

        let bytes = format::encode(table)?;
        atomic_write(&self.path, &bytes)?;

        log::debug!(
            "Wrote session state to {:?} ({} sessions, {} locks)",
            self.path,
            table.len(),
            lock_count(table)
        );
        Ok(())
    }

    fn read(&self) -> StoreResult<SessionTable> {
        match read_if_exists(&self.path)? {
            Some(bytes) => {
                let table = format::decode(&bytes)?;
                log::debug!(
                    "Read session state from {:?} ({} sessions, {} locks)",
                    self.path,
                    table.len(),
                    lock_count(&table)
                );
                Ok(table)
            }
            None => {
                log::debug!("No session state at {:?}, starting empty", self.path);
                Ok(SessionTable::new())
            }
        }
    }

    fn close(&self) -> StoreResult<()> {
        // Wait out any write in flight before giving up ownership.
        let _guard = lock_mutex_recover(&self.write_lock);

        if let Some(owner) = lock_mutex_recover(&self.owner).take() {
            owner.unlock().map_err(|e| {
                StoreError::io(format!("Failed to unlock {:?}", self.lock_path()), e)
            })?;
            log::debug!("Closed session state file {:?}", self.path);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
