// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Owner-only filesystem operations for security state.
//!
//! ## Guarantees
//!
//! - Directories are created `0700`, files `0600`. Permissions are applied to
//!   the open handle right after creation, before any secret byte is written.
//! - Writes go to a sibling temp file, are fsynced, then renamed over the
//!   target, so readers see either the old or the new content, never a mix.
//! - `secure_delete` overwrites a file with random bytes of equal length
//!   before unlinking it. This is best-effort only: journaling and
//!   copy-on-write filesystems or SSD wear levelling may keep old blocks.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use super::StoragePaths;
use crate::crypto;

/// Error type for secure storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage not initialized
    #[error("Storage not initialized")]
    NotInitialized,

    /// Random fill for secure delete failed
    #[error("Random source unavailable: {0}")]
    Random(#[from] crypto::CryptoError),
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Owner-only storage rooted at a per-user configuration directory.
#[derive(Debug, Clone)]
pub struct SecureStorage {
    paths: StoragePaths,
    initialized: bool,
}

impl SecureStorage {
    /// Create a new SecureStorage instance.
    ///
    /// Does NOT create the directory structure. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    /// Get the storage paths.
    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Check if storage is initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Create the directory structure with owner-only permissions.
    ///
    /// Safe to call multiple times (idempotent).
    pub fn initialize(&mut self) -> StorageResult<()> {
        let dirs = [
            self.paths.root().to_path_buf(),
            self.paths.auth_dir(),
            self.paths.vault_dir(),
        ];

        for dir in dirs {
            create_private_dir(&dir)?;
        }

        self.initialized = true;
        Ok(())
    }

    // ========== Generic JSON Operations ==========

    /// Read a JSON file and deserialize it.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StorageResult<T> {
        let bytes = self.read_raw(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize and write a JSON file atomically with owner-only permissions.
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_raw(path, &bytes)
    }

    // ========== Raw File Operations ==========

    /// Atomically replace `path` with `data` (temp file, fsync, rename).
    pub fn write_raw(&self, path: impl AsRef<Path>, data: &[u8]) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }

        let temp_path = temp_path_for(path);
        {
            let mut file = open_private(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, path)?;
        sync_parent(path);
        Ok(())
    }

    /// Read raw bytes from a file.
    pub fn read_raw(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let mut file = File::open(path.as_ref())?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Check if a file exists.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    /// Overwrite with random bytes, then unlink.
    ///
    /// Returns `Ok(false)` if the file did not exist.
    pub fn secure_delete(&self, path: impl AsRef<Path>) -> StorageResult<bool> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let path = path.as_ref();
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len() as usize,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        {
            let mut file = OpenOptions::new().write(true).open(path)?;
            let noise = crypto::random_bytes(len)?;
            file.write_all(&noise)?;
            file.sync_all()?;
        }

        fs::remove_file(path)?;
        Ok(true)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    if !dir.exists() {
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // A pre-existing temp file keeps its old mode; force it.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Best-effort directory fsync so the rename itself is durable.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
