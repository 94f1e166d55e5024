// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance, validation, refresh and revocation.
//!
//! ## Lifecycle
//!
//! ```text
//! ISSUED -> VALID -> EXPIRED
//!                 -> REVOKED
//! ```
//!
//! Both end states are terminal. Tokens are HS256 JWTs signed with a secret
//! generated on first start and kept in an owner-only file; the secret never
//! leaves this process.
//!
//! ## Validation Order
//!
//! 1. Signature
//! 2. `nbf <= now <= exp`
//! 3. Not revoked
//! 4. Fingerprint at issue equals the current fingerprint (and the device id
//!    matches, when bound)
//! 5. Required scopes are granted

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::claims::{TokenClaims, TokenType};
use super::error::TokenError;
use super::revocation::{FileRevocationStore, RevocationStore};
use super::scopes::{Scope, ScopeSet};
use crate::clock::Clock;
use crate::crypto;
use crate::identity::FingerprintProvider;
use crate::storage::{SecureStorage, StorageError};

/// Default access token lifetime (1 hour).
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 3600;

/// Default refresh token lifetime (30 days).
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 3600;

/// Signing secret length in bytes.
pub const SECRET_LEN: usize = 32;

/// Entropy of each `jti` in bytes.
const JTI_ENTROPY: usize = 16;

/// Access and refresh token issued together.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues and validates device-bound tokens.
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    fingerprint: Arc<dyn FingerprintProvider>,
    revocations: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    /// Scopes granted to access tokens minted from a refresh token.
    refresh_scopes: ScopeSet,
    leeway_secs: i64,
    /// Device id every token must carry, once bound.
    bound_device: Option<Uuid>,
}

impl TokenAuthority {
    pub fn new(
        secret: &[u8],
        fingerprint: Arc<dyn FingerprintProvider>,
        revocations: Arc<dyn RevocationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            fingerprint,
            revocations,
            clock,
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            refresh_scopes: ScopeSet::from([Scope::ExportCreate]),
            leeway_secs: 0,
            bound_device: None,
        }
    }

    /// Load (or create) the signing secret and the file revocation list.
    pub fn open(
        storage: &SecureStorage,
        fingerprint: Arc<dyn FingerprintProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        let secret = load_or_create_secret(storage)?;
        let revocations = Arc::new(FileRevocationStore::open(storage.clone())?);
        Ok(Self::new(&secret, fingerprint, revocations, clock))
    }

    pub fn with_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_ttl = access;
        self.refresh_ttl = refresh;
        self
    }

    pub fn with_refresh_scopes(mut self, scopes: ScopeSet) -> Self {
        self.refresh_scopes = scopes;
        self
    }

    /// Tolerated clock skew on `nbf`/`exp`, in seconds.
    pub fn with_leeway(mut self, seconds: i64) -> Self {
        self.leeway_secs = seconds.max(0);
        self
    }

    /// Reject tokens issued for any other device id.
    ///
    /// After the device identity is revoked and recreated, tokens bound to
    /// the old id fail with `FingerprintMismatch`.
    pub fn with_device_binding(mut self, device_id: Uuid) -> Self {
        self.bound_device = Some(device_id);
        self
    }

    pub fn revocations(&self) -> &Arc<dyn RevocationStore> {
        &self.revocations
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    // ========== Issuance ==========

    /// Issue an access token bound to the current device fingerprint.
    ///
    /// `ttl` defaults to the configured access lifetime.
    pub fn issue_access_token(
        &self,
        subject: &str,
        device_id: Uuid,
        scopes: ScopeSet,
        ttl: Option<Duration>,
    ) -> Result<String, TokenError> {
        self.issue(
            subject,
            device_id,
            scopes,
            TokenType::Access,
            ttl.unwrap_or(self.access_ttl),
        )
    }

    /// Issue a refresh token. Refresh tokens carry no scopes.
    pub fn issue_refresh_token(
        &self,
        subject: &str,
        device_id: Uuid,
        ttl: Option<Duration>,
    ) -> Result<String, TokenError> {
        self.issue(
            subject,
            device_id,
            ScopeSet::new(),
            TokenType::Refresh,
            ttl.unwrap_or(self.refresh_ttl),
        )
    }

    pub fn issue_token_pair(
        &self,
        subject: &str,
        device_id: Uuid,
        scopes: ScopeSet,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(subject, device_id, scopes, None)?,
            refresh_token: self.issue_refresh_token(subject, device_id, None)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    fn issue(
        &self,
        subject: &str,
        device_id: Uuid,
        scopes: ScopeSet,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::Malformed);
        }

        let now = self.clock.now();
        let claims = TokenClaims {
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            nbf: now.timestamp(),
            jti: crypto::random_token(JTI_ENTROPY)
                .map_err(|e| TokenError::Storage(e.to_string()))?,
            sub: subject.to_string(),
            device_id,
            device_fp: self.fingerprint.current(),
            scopes,
            token_type,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Storage(e.to_string()))?;

        debug!(jti = %claims.jti, %token_type, sub = %claims.sub, "Issued token");
        Ok(token)
    }

    // ========== Validation ==========

    /// Validate any token and check `required` scopes.
    pub fn validate(&self, token: &str, required: &[Scope]) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token)?;
        claims.require(required)?;
        Ok(claims)
    }

    /// Validate a token that must be an access token.
    pub fn validate_access(
        &self,
        token: &str,
        required: &[Scope],
    ) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(TokenError::WrongTokenType);
        }
        claims.require(required)?;
        Ok(claims)
    }

    /// Everything except the scope check.
    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_verified(token)?;

        let now = self.clock.now().timestamp();
        if now + self.leeway_secs < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        if now > claims.exp + self.leeway_secs {
            return Err(TokenError::Expired);
        }

        if self.revocations.contains(&claims.jti) {
            return Err(TokenError::Revoked);
        }

        if claims.device_fp != self.fingerprint.current() {
            warn!(
                jti = %claims.jti,
                device_id = %claims.device_id,
                security_event = "fingerprint_mismatch",
                "Token presented from a different environment"
            );
            return Err(TokenError::FingerprintMismatch);
        }

        if let Some(bound) = self.bound_device {
            if claims.device_id != bound {
                warn!(
                    jti = %claims.jti,
                    device_id = %claims.device_id,
                    security_event = "device_mismatch",
                    "Token issued for another device identity"
                );
                return Err(TokenError::FingerprintMismatch);
            }
        }

        Ok(claims)
    }

    /// Check the signature only. Time claims are checked by the caller
    /// against the injected clock.
    fn decode_verified(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature
                | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => TokenError::SignatureInvalid,
                _ => TokenError::Malformed,
            })
    }

    // ========== Refresh & Revocation ==========

    /// Mint a new access token from a refresh token.
    ///
    /// The refresh token itself stays valid; see [`rotate_refresh`] for the
    /// rotating variant.
    ///
    /// [`rotate_refresh`]: TokenAuthority::rotate_refresh
    pub fn refresh(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.verify_refresh(refresh_token)?;
        self.issue_access_token(
            &claims.sub,
            claims.device_id,
            self.refresh_scopes.clone(),
            None,
        )
    }

    /// Revoke the presented refresh token and issue a new pair.
    ///
    /// Only the caller whose revocation actually inserts the `jti` gets a
    /// pair; concurrent reuse of the same token fails with `Revoked`.
    pub fn rotate_refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.verify_refresh(refresh_token)?;
        if !self.revocations.add(&claims.jti, claims.exp)? {
            warn!(
                jti = %claims.jti,
                security_event = "refresh_reuse",
                "Refresh token presented again during rotation"
            );
            return Err(TokenError::Revoked);
        }
        info!(jti = %claims.jti, "Rotated refresh token");
        self.issue_token_pair(&claims.sub, claims.device_id, self.refresh_scopes.clone())
    }

    fn verify_refresh(&self, refresh_token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(refresh_token).map_err(|e| match e {
            TokenError::Malformed => TokenError::MalformedRefresh,
            other => other,
        })?;
        if !claims.is_refresh() {
            return Err(TokenError::MalformedRefresh);
        }
        Ok(claims)
    }

    /// Revoke a token, expired or not.
    ///
    /// The signature must be valid. Returns only after the revocation is
    /// durably persisted.
    pub fn revoke(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_verified(token)?;
        self.revocations.add(&claims.jti, claims.exp)?;
        info!(jti = %claims.jti, token_type = %claims.token_type, "Token revoked");
        Ok(claims)
    }

    /// Drop revocation entries for tokens that have expired anyway.
    ///
    /// Entries stay until `exp + leeway` has passed, since `verify` still
    /// accepts the token until then.
    pub fn compact_revocations(&self) -> Result<usize, TokenError> {
        let cutoff = Duration::try_seconds(self.leeway_secs)
            .and_then(|leeway| self.clock.now().checked_sub_signed(leeway))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.revocations.compact(cutoff)
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway_secs", &self.leeway_secs)
            .field("revoked", &self.revocations.len())
            .finish_non_exhaustive()
    }
}

/// Read the signing secret, generating it on first use.
pub fn load_or_create_secret(storage: &SecureStorage) -> Result<Zeroizing<Vec<u8>>, TokenError> {
    let path = storage.paths().token_secret();
    match storage.read_raw(&path) {
        Ok(secret) if secret.len() >= SECRET_LEN => Ok(Zeroizing::new(secret)),
        Ok(_) => Err(TokenError::Storage(
            "token signing secret is too short".to_string(),
        )),
        Err(StorageError::NotFound(_)) => {
            let secret = Zeroizing::new(
                crypto::random_bytes(SECRET_LEN).map_err(|e| TokenError::Storage(e.to_string()))?,
            );
            storage
                .write_raw(&path, &secret)
                .map_err(|e| TokenError::Storage(e.to_string()))?;
            info!("Generated new token signing secret");
            Ok(secret)
        }
        Err(e) => Err(TokenError::Storage(e.to_string())),
    }
}
