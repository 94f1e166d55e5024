// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable per-install device identifier.

use std::sync::Mutex;

use tracing::{info, warn};
use uuid::Uuid;

use super::fingerprint::{Fingerprint, FingerprintProvider, HostCharacteristics};
use crate::crypto::{self, CryptoError, SymmetricKey};
use crate::storage::{SecureStorage, StorageError};

/// Associated data binding the ciphertext to its purpose.
const DEVICE_ID_AAD: &[u8] = b"export-guard/device-id/v1";

/// Device identity errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The stored identifier exists but cannot be decrypted or parsed.
    #[error("device identity is corrupt: {0}")]
    Corrupt(String),

    #[error("device identity storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("device identity key generation failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// Generates, loads and revokes the device identifier.
///
/// The UUID is encrypted at rest under a random key kept in a separate
/// owner-only file. It never changes across restarts until [`revoke`] is
/// called.
///
/// [`revoke`]: DeviceIdentity::revoke
#[derive(Debug)]
pub struct DeviceIdentity {
    storage: SecureStorage,
    host: Option<HostCharacteristics>,
    lock: Mutex<()>,
}

impl DeviceIdentity {
    pub fn new(storage: SecureStorage) -> Self {
        Self {
            storage,
            host: None,
            lock: Mutex::new(()),
        }
    }

    /// Pin the host characteristics instead of detecting them.
    pub fn with_host(mut self, host: HostCharacteristics) -> Self {
        self.host = Some(host);
        self
    }

    /// Return the persisted device id, creating one on first use.
    pub fn get_or_create_device_id(&self) -> Result<Uuid, IdentityError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let paths = self.storage.paths();

        if self.storage.exists(paths.device_id()) {
            return self.load_device_id();
        }

        let device_id = Uuid::new_v4();
        let key = SymmetricKey::generate()?;
        let ciphertext = crypto::seal(&key, DEVICE_ID_AAD, device_id.to_string().as_bytes())?;

        // Key first: a crash in between leaves no identifier and we regenerate.
        self.storage.write_raw(paths.device_key(), key.as_bytes())?;
        self.storage.write_raw(paths.device_id(), &ciphertext)?;

        info!(%device_id, "Created new device identity");
        Ok(device_id)
    }

    fn load_device_id(&self) -> Result<Uuid, IdentityError> {
        let paths = self.storage.paths();

        let key_bytes = match self.storage.read_raw(paths.device_key()) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                return Err(IdentityError::Corrupt("device key is missing".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let key = SymmetricKey::from_slice(&key_bytes)
            .map_err(|_| IdentityError::Corrupt("device key has wrong length".to_string()))?;

        let ciphertext = self.storage.read_raw(paths.device_id())?;
        let plaintext = crypto::open(&key, DEVICE_ID_AAD, &ciphertext).map_err(|_| {
            warn!("Device identifier failed authenticated decryption");
            IdentityError::Corrupt("device identifier failed to decrypt".to_string())
        })?;

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| IdentityError::Corrupt("device identifier is not UTF-8".to_string()))?;
        Uuid::parse_str(text)
            .map_err(|_| IdentityError::Corrupt("device identifier is not a UUID".to_string()))
    }

    /// Fingerprint of the current environment.
    pub fn fingerprint(&self) -> Fingerprint {
        match &self.host {
            Some(host) => Fingerprint::compute(host),
            None => Fingerprint::compute(&HostCharacteristics::detect()),
        }
    }

    /// Delete the stored identifier and its key.
    ///
    /// The next `get_or_create_device_id` generates a new identity. Returns
    /// `true` if an identity existed.
    pub fn revoke(&self) -> Result<bool, IdentityError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let paths = self.storage.paths();

        let had_id = self.storage.secure_delete(paths.device_id())?;
        let had_key = self.storage.secure_delete(paths.device_key())?;

        if had_id || had_key {
            warn!("Device identity revoked; all tokens bound to it are now invalid");
        }
        Ok(had_id)
    }
}

impl FingerprintProvider for DeviceIdentity {
    fn current(&self) -> Fingerprint {
        self.fingerprint()
    }
}
