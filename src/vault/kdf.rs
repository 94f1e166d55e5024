// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PBKDF2-HMAC-SHA256 key derivation for the vault.

use std::num::NonZeroU32;

use ring::pbkdf2;
use tracing::warn;

use crate::crypto::{SymmetricKey, KEY_LEN};

/// Lower bound on PBKDF2 iterations. Requests below it are raised to it.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Iterations used when the caller does not choose.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = MIN_PBKDF2_ITERATIONS;

/// Length of the persisted vault salt.
pub const SALT_LEN: usize = 32;

/// Derive the vault key from a stable device secret and the vault salt.
pub fn derive_key(device_secret: &[u8], salt: &[u8], iterations: u32) -> SymmetricKey {
    if iterations < MIN_PBKDF2_ITERATIONS {
        warn!(
            requested = iterations,
            minimum = MIN_PBKDF2_ITERATIONS,
            "PBKDF2 iteration count below minimum; using minimum"
        );
    }
    let rounds = NonZeroU32::new(iterations.max(MIN_PBKDF2_ITERATIONS)).unwrap_or(NonZeroU32::MIN);

    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        salt,
        device_secret,
        &mut out,
    );
    SymmetricKey::from_bytes(out)
}
