// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::TokenError;
use super::scopes::{Scope, ScopeSet};
use crate::identity::Fingerprint;

/// Access tokens authorize requests; refresh tokens only mint access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims carried by every token this service signs.
///
/// Timestamps are Unix seconds. Consumers read these through
/// `TokenAuthority::validate`, never by decoding the token themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issued at
    pub iat: i64,
    /// Expires at (always later than `iat`)
    pub exp: i64,
    /// Not valid before
    pub nbf: i64,
    /// Unique token id, the revocation key
    pub jti: String,
    /// Subject (operator or automation client name)
    pub sub: String,
    pub device_id: Uuid,
    /// Fingerprint of the device at issue time
    pub device_fp: Fingerprint,
    /// Empty for refresh tokens
    #[serde(default)]
    pub scopes: ScopeSet,
    pub token_type: TokenType,
}

impl TokenClaims {
    /// Check that every required scope is granted.
    pub fn require(&self, required: &[Scope]) -> Result<(), TokenError> {
        if required.iter().all(|scope| self.scopes.contains(scope)) {
            Ok(())
        } else {
            Err(TokenError::InsufficientScope)
        }
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type == TokenType::Refresh
    }
}
