// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Export Guard - Security Core for the Research Export Webhook
//!
//! Protects a low-trust automation endpoint (mobile shortcuts, third-party
//! automation tools) that exports research content to a remote document
//! store.
//!
//! ## Modules
//!
//! - `identity` - device identifier and environment fingerprint
//! - `vault` - encrypted credential store with optional presence check
//! - `auth` - device-bound token issuance, validation and revocation
//! - `providers` - OAuth authorization-code client
//! - `rate_limit` - per-client token buckets
//! - `validation` - URL, content and shell-argument checks
//! - `api` - webhook router (Axum)
//! - `storage` - owner-only on-disk state

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod providers;
pub mod rate_limit;
pub mod state;
pub mod storage;
pub mod validation;
pub mod vault;
