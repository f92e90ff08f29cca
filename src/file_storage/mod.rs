//! File helpers for the file-backed session store
//!
//! Everything here works on whole files: a state file is only ever replaced by
//! renaming a complete, fsynced sibling over it.
//!
//! ## Storage Locations
//!
//! Default state directory (`~/.lock-session-store/`):
//! - `sessions.json` - session state written by the file backend
//! - `sessions.json.lock` - ownership sidecar held while a store is open
//! - `sessions.db` - session state written by the SQLite backend

use crate::store::{StoreError, StoreResult};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the default state directory under the user's home
pub const STATE_DIR_NAME: &str = ".lock-session-store";

/// Get the default state directory in user home
pub fn get_default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR_NAME)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> StoreResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| StoreError::io(format!("Failed to create directory {:?}", path), e))?;
    }
    Ok(())
}

/// Path with `suffix` appended to the full file name (`a.json` -> `a.json.tmp`)
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Temp file used while replacing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

/// Write data to a file atomically (temp file + fsync + rename)
///
/// Once this returns Ok the new content is durable. If it fails, or the
/// process dies part way, `path` still holds its previous content.
pub fn atomic_write(path: &Path, content: &[u8]) -> StoreResult<()> {
    let temp_path = temp_path(path);

    // Ensure parent directory exists
    if let Some(parent) = parent_dir(path) {
        ensure_dir(parent)?;
    }

    let result = write_synced(&temp_path, content).and_then(|_| {
        fs::rename(&temp_path, path).map_err(|e| {
            StoreError::io(format!("Failed to rename {:?} to {:?}", temp_path, path), e)
        })
    });

    if let Err(e) = result {
        // Leave no half-written temp file behind; the target is untouched.
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Some(parent) = parent_dir(path) {
        sync_dir(parent)?;
    }

    Ok(())
}

fn write_synced(path: &Path, content: &[u8]) -> StoreResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| StoreError::io(format!("Failed to create temp file {:?}", path), e))?;

    file.write_all(content)
        .map_err(|e| StoreError::io(format!("Failed to write temp file {:?}", path), e))?;

    file.sync_all()
        .map_err(|e| StoreError::io(format!("Failed to sync temp file {:?}", path), e))
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Flush a directory entry so a completed rename survives power loss
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> StoreResult<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StoreError::io(format!("Failed to sync directory {:?}", dir), e))
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> StoreResult<()> {
    Ok(())
}

/// Read a whole file, returning None if it does not exist
pub fn read_if_exists(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(format!("Failed to read file {:?}", path), e)),
    }
}

/// Remove a temp file left by an interrupted write
///
/// Returns true if one was found.
pub fn remove_stale_temp(path: &Path) -> StoreResult<bool> {
    let temp_path = temp_path(path);
    match fs::remove_file(&temp_path) {
        Ok(()) => {
            log::warn!(
                "Discarded unfinished state write {:?}; keeping last committed state",
                temp_path
            );
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(
            format!("Failed to remove stale temp file {:?}", temp_path),
            e,
        )),
    }
}
