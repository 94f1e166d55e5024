// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk security state layout.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Application name used to locate the per-user configuration directory.
pub const APP_NAME: &str = "export-guard";

/// Fallback root when no per-user configuration directory can be determined.
pub const FALLBACK_ROOT: &str = ".export-guard";

/// Storage path utilities for the per-user security state.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    /// `~/.config/export-guard` on Linux, the platform equivalent elsewhere.
    fn default() -> Self {
        match ProjectDirs::from("", "", APP_NAME) {
            Some(dirs) => Self::new(dirs.config_dir()),
            None => Self::new(FALLBACK_ROOT),
        }
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all security state.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Auth Paths ==========

    /// Directory holding device identity and token authority state.
    pub fn auth_dir(&self) -> PathBuf {
        self.root.join("auth")
    }

    /// Encrypted device identifier.
    pub fn device_id(&self) -> PathBuf {
        self.auth_dir().join("device_id.enc")
    }

    /// Key that decrypts the device identifier.
    pub fn device_key(&self) -> PathBuf {
        self.auth_dir().join(".device_key")
    }

    /// Token signing secret.
    pub fn token_secret(&self) -> PathBuf {
        self.auth_dir().join(".jwt_secret")
    }

    /// Persisted revocation list.
    pub fn revocation_list(&self) -> PathBuf {
        self.auth_dir().join("token_blacklist.json")
    }

    // ========== Vault Paths ==========

    /// Directory holding the credential vault.
    pub fn vault_dir(&self) -> PathBuf {
        self.root.join("secure")
    }

    /// Encrypted credential blob.
    pub fn vault_blob(&self) -> PathBuf {
        self.vault_dir().join("credentials.enc")
    }

    /// Key-derivation salt for the vault.
    pub fn vault_salt(&self) -> PathBuf {
        self.vault_dir().join(".salt")
    }

    // ========== Outbox Paths ==========

    /// Validated exports waiting for the document writer.
    pub fn outbox_dir(&self) -> PathBuf {
        self.root.join("outbox")
    }

    pub fn outbox_entry(&self, id: &str) -> PathBuf {
        self.outbox_dir().join(format!("{id}.json"))
    }
}
