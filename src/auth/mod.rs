// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Authority
//!
//! Device-bound bearer tokens for the export webhook.
//!
//! ## Auth Flow
//!
//! 1. The operator issues a token pair on the device (`export-guard issue-token`)
//! 2. Automation clients send `Authorization: Bearer <access token>`
//! 3. The server:
//!    - Verifies the HS256 signature with its local secret
//!    - Checks `nbf`/`exp` against its clock
//!    - Rejects revoked `jti` values
//!    - Recomputes the device fingerprint and requires an exact match
//!    - Checks the scopes the endpoint needs
//!
//! ## Security
//!
//! - Failures answer a generic 401; the precise kind is only logged
//! - Revocation is durable before `revoke` returns
//! - A token copied to another machine fails the fingerprint check

pub mod authority;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod revocation;
pub mod scopes;

pub use authority::{TokenAuthority, TokenPair};
pub use claims::{TokenClaims, TokenType};
pub use error::TokenError;
pub use extractor::{Auth, BearerToken};
pub use revocation::{FileRevocationStore, RevocationStore};
pub use scopes::{Scope, ScopeSet};
