// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

/// Why a token was rejected or a token operation failed.
///
/// Callers branch on the variant: an expired token is routine, a fingerprint
/// mismatch may be theft, a bad signature may be forgery.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token has been revoked")]
    Revoked,

    #[error("token signature is invalid")]
    SignatureInvalid,

    /// Presented from a different device or environment than it was issued to.
    #[error("token fingerprint does not match this device")]
    FingerprintMismatch,

    #[error("token lacks a required scope")]
    InsufficientScope,

    /// A refresh was attempted with something that is not a refresh token.
    #[error("refresh token is malformed or of the wrong type")]
    MalformedRefresh,

    /// An access-only endpoint received a non-access token.
    #[error("token type is not accepted here")]
    WrongTokenType,

    #[error("token is malformed")]
    Malformed,

    #[error("missing or malformed authorization header")]
    MissingBearer,

    /// The revocation list or signing secret could not be read or written.
    #[error("token storage error: {0}")]
    Storage(String),
}

#[derive(Serialize)]
struct UnauthorizedBody {
    error: &'static str,
}

impl TokenError {
    /// Stable code for logs and audit events.
    pub fn error_code(&self) -> &'static str {
        match self {
            TokenError::Expired => "token_expired",
            TokenError::NotYetValid => "token_not_yet_valid",
            TokenError::Revoked => "token_revoked",
            TokenError::SignatureInvalid => "invalid_signature",
            TokenError::FingerprintMismatch => "fingerprint_mismatch",
            TokenError::InsufficientScope => "insufficient_scope",
            TokenError::MalformedRefresh => "malformed_refresh",
            TokenError::WrongTokenType => "wrong_token_type",
            TokenError::Malformed => "malformed_token",
            TokenError::MissingBearer => "missing_bearer",
            TokenError::Storage(_) => "token_storage_error",
        }
    }

    /// Whether this rejection should be treated as a possible attack.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            TokenError::SignatureInvalid | TokenError::FingerprintMismatch | TokenError::Revoked
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TokenError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Every rejection looks the same on the wire; the precise kind goes to logs.
impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        warn!(
            error_code = self.error_code(),
            security_event = self.is_security_event(),
            "Token rejected"
        );
        let status = self.status_code();
        let error = if status == StatusCode::UNAUTHORIZED {
            "unauthorized"
        } else {
            "internal error"
        };
        (status, Json(UnauthorizedBody { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(error: TokenError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn rejections_are_indistinguishable() {
        let expired = body_of(TokenError::Expired).await;
        let mismatch = body_of(TokenError::FingerprintMismatch).await;
        let scope = body_of(TokenError::InsufficientScope).await;

        assert_eq!(expired.0, StatusCode::UNAUTHORIZED);
        assert_eq!(expired, mismatch);
        assert_eq!(expired, scope);
        assert_eq!(expired.1, serde_json::json!({ "error": "unauthorized" }));
    }

    #[tokio::test]
    async fn storage_failure_is_500() {
        let (status, _) = body_of(TokenError::Storage("disk full".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_codes_are_distinct() {
        assert_eq!(TokenError::Expired.error_code(), "token_expired");
        assert_eq!(TokenError::FingerprintMismatch.error_code(), "fingerprint_mismatch");
        assert!(TokenError::FingerprintMismatch.is_security_event());
        assert!(!TokenError::Expired.is_security_event());
    }
}
