// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Revoked-token store.
//!
//! The token authority only needs `contains` and `add`; the file-backed store
//! is the default and can be swapped for a database without touching it.
//!
//! ## File Format
//!
//! ```json
//! { "tokens": [ { "jti": "...", "expires_at": 1700003600 } ] }
//! ```
//!
//! The expiry is kept so `compact` can drop entries for tokens that could
//! no longer validate anyway.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::TokenError;
use crate::storage::{SecureStorage, StorageError};

/// Persistent set of revoked token ids.
pub trait RevocationStore: Send + Sync {
    fn contains(&self, jti: &str) -> bool;

    /// Record `jti` as revoked. Must be durable before returning `Ok`.
    ///
    /// Returns `false` when `jti` was already revoked. The check and the
    /// insert are atomic, so exactly one concurrent caller sees `true`.
    fn add(&self, jti: &str, expires_at: i64) -> Result<bool, TokenError>;

    /// Drop entries whose token expired before `cutoff`. Returns how many.
    fn compact(&self, cutoff: DateTime<Utc>) -> Result<usize, TokenError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RevocationFile {
    tokens: Vec<RevokedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RevokedEntry {
    jti: String,
    expires_at: i64,
}

/// Revocation list mirrored to a JSON file under the auth directory.
#[derive(Debug)]
pub struct FileRevocationStore {
    storage: SecureStorage,
    entries: RwLock<HashMap<String, i64>>,
    write_lock: Mutex<()>,
}

impl FileRevocationStore {
    /// Load the persisted list. A missing file is an empty list.
    pub fn open(storage: SecureStorage) -> Result<Self, TokenError> {
        let path = storage.paths().revocation_list();
        let file: RevocationFile = match storage.read_json(&path) {
            Ok(file) => file,
            Err(StorageError::NotFound(_)) => RevocationFile::default(),
            Err(e) => return Err(TokenError::Storage(e.to_string())),
        };

        let entries: HashMap<String, i64> = file
            .tokens
            .into_iter()
            .map(|entry| (entry.jti, entry.expires_at))
            .collect();
        debug!(count = entries.len(), "Loaded revocation list");

        Ok(Self {
            storage,
            entries: RwLock::new(entries),
            write_lock: Mutex::new(()),
        })
    }

    /// Write `snapshot`, then publish it to readers.
    fn persist(&self, snapshot: HashMap<String, i64>) -> Result<(), TokenError> {
        let mut tokens: Vec<RevokedEntry> = snapshot
            .iter()
            .map(|(jti, &expires_at)| RevokedEntry {
                jti: jti.clone(),
                expires_at,
            })
            .collect();
        tokens.sort_by(|a, b| a.jti.cmp(&b.jti));

        self.storage
            .write_json(self.storage.paths().revocation_list(), &RevocationFile { tokens })
            .map_err(|e| TokenError::Storage(e.to_string()))?;

        *self.entries.write().unwrap_or_else(|p| p.into_inner()) = snapshot;
        Ok(())
    }

    fn snapshot(&self) -> HashMap<String, i64> {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl RevocationStore for FileRevocationStore {
    fn contains(&self, jti: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(jti)
    }

    fn add(&self, jti: &str, expires_at: i64) -> Result<bool, TokenError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.contains(jti) {
            return Ok(false);
        }
        let mut snapshot = self.snapshot();
        snapshot.insert(jti.to_string(), expires_at);
        self.persist(snapshot)?;
        Ok(true)
    }

    fn compact(&self, cutoff: DateTime<Utc>) -> Result<usize, TokenError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut snapshot = self.snapshot();
        let before = snapshot.len();
        let cutoff = cutoff.timestamp();
        snapshot.retain(|_, expires_at| *expires_at >= cutoff);

        let removed = before - snapshot.len();
        if removed > 0 {
            self.persist(snapshot)?;
            info!(removed, remaining = before - removed, "Compacted revocation list");
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_storage(dir: &TempDir) -> SecureStorage {
        let mut storage = SecureStorage::new(StoragePaths::new(dir.path()));
        storage.initialize().unwrap();
        storage
    }

    #[test]
    fn add_is_visible_and_durable() {
        let dir = TempDir::new().unwrap();
        let store = FileRevocationStore::open(test_storage(&dir)).unwrap();
        assert!(!store.contains("a"));

        store.add("a", 100).unwrap();
        assert!(store.contains("a"));

        let reloaded = FileRevocationStore::open(test_storage(&dir)).unwrap();
        assert!(reloaded.contains("a"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn add_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileRevocationStore::open(test_storage(&dir)).unwrap();
        assert!(store.add("a", 100).unwrap());
        assert!(!store.add("a", 100).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_add_reports_one_insert() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileRevocationStore::open(test_storage(&dir)).unwrap());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.add("shared", 100).unwrap()
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&fresh| fresh)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_write_is_reported_and_not_applied() {
        let dir = TempDir::new().unwrap();
        let store = FileRevocationStore::open(test_storage(&dir)).unwrap();

        // Replace the auth directory with a regular file so the write fails.
        std::fs::remove_dir_all(dir.path().join("auth")).unwrap();
        std::fs::write(dir.path().join("auth"), b"not a dir").unwrap();

        assert!(matches!(store.add("a", 100), Err(TokenError::Storage(_))));
        assert!(!store.contains("a"));
    }

    #[test]
    fn compact_drops_expired_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileRevocationStore::open(test_storage(&dir)).unwrap();
        store.add("old", 1_000).unwrap();
        store.add("live", 5_000).unwrap();

        let now = Utc.timestamp_opt(2_000, 0).unwrap();
        assert_eq!(store.compact(now).unwrap(), 1);
        assert!(!store.contains("old"));
        assert!(store.contains("live"));

        let reloaded = FileRevocationStore::open(test_storage(&dir)).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let storage = test_storage(&dir);
        std::fs::write(storage.paths().revocation_list(), b"{not json").unwrap();
        assert!(matches!(
            FileRevocationStore::open(storage),
            Err(TokenError::Storage(_))
        ));
    }
}
