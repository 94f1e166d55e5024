// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secure Storage Module
//!
//! Persistent security state lives under a per-user configuration directory
//! with owner-only permissions.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.config/export-guard/
//!   auth/
//!     device_id.enc         # AES-GCM encrypted device UUID
//!     .device_key           # key for device_id.enc (stored separately)
//!     .jwt_secret           # token signing secret (never transmitted)
//!     token_blacklist.json  # revoked jti -> expiry
//!   secure/
//!     credentials.enc       # vault blob (nonce || ciphertext || tag)
//!     .salt                 # PBKDF2 salt, 32 random bytes
//!   outbox/
//!     <uuid>.json           # validated exports for the document writer
//! ```

pub mod paths;
pub mod secure_fs;

pub use paths::StoragePaths;
pub use secure_fs::{SecureStorage, StorageError, StorageResult};
