// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for bearer-token authentication.
//!
//! ```rust,ignore
//! async fn handler(Auth(claims): Auth) -> Result<Json<Out>, ApiError> {
//!     claims.require(&[Scope::ExportCreate])?;
//!     // ...
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{TokenClaims, TokenError};
use crate::state::AppState;

/// A validated access token.
///
/// Rejects with a generic 401 on any failure; the precise reason is logged.
pub struct Auth(pub TokenClaims);

impl FromRequestParts<AppState> for Auth {
    type Rejection = TokenError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.authority.validate_access(token, &[])?;
        Ok(Auth(claims))
    }
}

/// The raw bearer token, unvalidated. Used by `/auth/revoke`.
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = TokenError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(parts).map(|token| BearerToken(token.to_string()))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, TokenError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(TokenError::MissingBearer)?
        .to_str()
        .map_err(|_| TokenError::MissingBearer)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(TokenError::MissingBearer)?
        .trim();
    if token.is_empty() {
        return Err(TokenError::MissingBearer);
    }
    Ok(token)
}
