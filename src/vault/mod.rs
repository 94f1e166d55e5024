// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Vault
//!
//! Encrypts a string-to-string credential map at rest.
//!
//! ## Key Material
//!
//! `key = PBKDF2-HMAC-SHA256(device_secret, salt, iterations >= 100_000)`.
//! The salt (32 random bytes) is generated once and stored next to the blob;
//! the device secret is supplied by the caller and never written by the
//! vault. The blob is AES-256-GCM, so any modification makes `load` fail
//! with `DecryptFailed` instead of returning altered plaintext.
//!
//! ## Concurrency
//!
//! Saves, deletes and the read-modify-write helpers are serialized by one
//! lock. Each save replaces the whole file atomically.

pub mod kdf;
pub mod presence;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::crypto::{self, SymmetricKey};
use crate::storage::{SecureStorage, StorageError};

pub use kdf::{derive_key, DEFAULT_PBKDF2_ITERATIONS, MIN_PBKDF2_ITERATIONS, SALT_LEN};
pub use presence::{PresenceCheck, PresenceGate, PresenceOutcome, TermuxFingerprint};

/// Associated data binding the blob to its purpose.
const VAULT_AAD: &[u8] = b"export-guard/vault/v1";

/// Decrypted vault contents.
pub type Credentials = BTreeMap<String, String>;

/// Vault errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("no vault file exists")]
    NotFound,

    /// Tampered blob, wrong device secret or changed salt.
    #[error("vault could not be decrypted")]
    DecryptFailed,

    #[error("vault write failed: {0}")]
    WriteFailed(String),

    #[error("presence check denied vault access")]
    PresenceDenied,

    #[error("vault storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Encrypted credential store.
#[derive(Debug)]
pub struct Vault {
    storage: SecureStorage,
    key: SymmetricKey,
    presence: PresenceGate,
    lock: Mutex<()>,
}

impl Vault {
    /// Open the vault with the default iteration count.
    pub fn open(storage: SecureStorage, device_secret: &[u8]) -> Result<Self, VaultError> {
        Self::open_with_iterations(storage, device_secret, DEFAULT_PBKDF2_ITERATIONS)
    }

    /// Open the vault, creating its salt on first use.
    pub fn open_with_iterations(
        storage: SecureStorage,
        device_secret: &[u8],
        iterations: u32,
    ) -> Result<Self, VaultError> {
        let salt = load_or_create_salt(&storage)?;
        let key = derive_key(device_secret, &salt, iterations);
        Ok(Self {
            storage,
            key,
            presence: PresenceGate::Disabled,
            lock: Mutex::new(()),
        })
    }

    pub fn with_presence_gate(mut self, gate: PresenceGate) -> Self {
        self.presence = gate;
        self
    }

    /// Run the presence gate. Fails open when the mechanism is unavailable.
    pub fn require_presence_check(&self) -> bool {
        self.presence.check()
    }

    /// Encrypt and atomically replace the stored credentials.
    pub fn save(&self, credentials: &Credentials) -> Result<(), VaultError> {
        if !self.require_presence_check() {
            return Err(VaultError::PresenceDenied);
        }
        let _guard = self.write_lock();
        self.save_locked(credentials)
    }

    /// Decrypt the stored credentials.
    pub fn load(&self) -> Result<Credentials, VaultError> {
        if !self.require_presence_check() {
            return Err(VaultError::PresenceDenied);
        }
        self.load_unchecked()
    }

    /// Overwrite the blob with random bytes and remove it (best-effort).
    ///
    /// Returns `true` if a vault existed.
    pub fn delete(&self) -> Result<bool, VaultError> {
        let _guard = self.write_lock();
        let existed = self
            .storage
            .secure_delete(self.storage.paths().vault_blob())
            .map_err(|e| VaultError::WriteFailed(e.to_string()))?;
        if existed {
            info!("Vault deleted");
        }
        Ok(existed)
    }

    // ========== Credential Map Helpers ==========

    /// Single credential, `None` if absent or the vault does not exist.
    pub fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        match self.load() {
            Ok(mut credentials) => Ok(credentials.remove(key)),
            Err(VaultError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Insert or replace one credential.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), VaultError> {
        self.update(|credentials| {
            credentials.insert(key.into(), value.into());
        })
    }

    /// Remove one credential. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> Result<bool, VaultError> {
        let mut removed = false;
        self.update(|credentials| {
            removed = credentials.remove(key).is_some();
        })?;
        Ok(removed)
    }

    /// Names of stored credentials.
    pub fn keys(&self) -> Result<Vec<String>, VaultError> {
        match self.load() {
            Ok(credentials) => Ok(credentials.into_keys().collect()),
            Err(VaultError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Read-modify-write under the vault lock. A missing vault starts empty.
    pub fn update<F>(&self, mutate: F) -> Result<(), VaultError>
    where
        F: FnOnce(&mut Credentials),
    {
        if !self.require_presence_check() {
            return Err(VaultError::PresenceDenied);
        }
        let _guard = self.write_lock();
        let mut credentials = match self.load_unchecked() {
            Ok(credentials) => credentials,
            Err(VaultError::NotFound) => Credentials::new(),
            Err(e) => return Err(e),
        };
        mutate(&mut credentials);
        self.save_locked(&credentials)
    }

    /// Move `KEY=VALUE` lines from a plaintext env file into the vault.
    ///
    /// Blank lines and `#` comments are skipped. On success the plaintext
    /// file is renamed to `<name>.backup` with owner-only permissions, and the
    /// number of imported entries is returned.
    pub fn migrate_from_env(&self, env_file: impl AsRef<Path>) -> Result<usize, VaultError> {
        let env_file = env_file.as_ref();
        let text = fs::read_to_string(env_file).map_err(StorageError::from)?;
        let imported = parse_env(&text);
        if imported.is_empty() {
            warn!(path = %env_file.display(), "No credentials found in env file");
            return Ok(0);
        }

        let count = imported.len();
        self.update(|credentials| credentials.extend(imported))?;

        let backup = backup_path_for(env_file);
        fs::rename(env_file, &backup).map_err(|e| VaultError::WriteFailed(e.to_string()))?;
        restrict_permissions(&backup).map_err(|e| VaultError::WriteFailed(e.to_string()))?;

        info!(
            count,
            backup = %backup.display(),
            "Migrated credentials from env file; delete the backup once verified"
        );
        Ok(count)
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save_locked(&self, credentials: &Credentials) -> Result<(), VaultError> {
        let plaintext =
            serde_json::to_vec(credentials).map_err(|e| VaultError::WriteFailed(e.to_string()))?;
        let blob = crypto::seal(&self.key, VAULT_AAD, &plaintext)
            .map_err(|e| VaultError::WriteFailed(e.to_string()))?;
        self.storage
            .write_raw(self.storage.paths().vault_blob(), &blob)
            .map_err(|e| VaultError::WriteFailed(e.to_string()))
    }

    fn load_unchecked(&self) -> Result<Credentials, VaultError> {
        let blob = match self.storage.read_raw(self.storage.paths().vault_blob()) {
            Ok(blob) => blob,
            Err(StorageError::NotFound(_)) => return Err(VaultError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let plaintext = crypto::open(&self.key, VAULT_AAD, &blob).map_err(|_| {
            warn!(security_event = "vault_decrypt_failed", "Vault failed authenticated decryption");
            VaultError::DecryptFailed
        })?;
        serde_json::from_slice(&plaintext).map_err(|_| VaultError::DecryptFailed)
    }
}

fn load_or_create_salt(storage: &SecureStorage) -> Result<Vec<u8>, VaultError> {
    let path = storage.paths().vault_salt();
    match storage.read_raw(&path) {
        Ok(salt) if !salt.is_empty() => Ok(salt),
        Ok(_) | Err(StorageError::NotFound(_)) => {
            let salt = crypto::random_bytes(SALT_LEN)
                .map_err(|e| VaultError::WriteFailed(e.to_string()))?;
            storage
                .write_raw(&path, &salt)
                .map_err(|e| VaultError::WriteFailed(e.to_string()))?;
            Ok(salt)
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_env(text: &str) -> Credentials {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
