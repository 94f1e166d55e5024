// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Device Identity
//!
//! - `device` - durable, encrypted, revocable per-install UUID
//! - `fingerprint` - deterministic, non-secret hash of host characteristics
//!
//! Revoking the identity invalidates every token bound to it.

pub mod device;
pub mod fingerprint;

pub use device::{DeviceIdentity, IdentityError};
pub use fingerprint::{Fingerprint, FingerprintProvider, HostCharacteristics};
