// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth 2.0 authorization-code flow against the document provider (Notion).
//!
//! Tokens returned by the provider are stored only in the credential vault.

use std::{sync::Arc, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::crypto;
use crate::vault::{Vault, VaultError};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://api.notion.com/v1/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.notion.com/v1/oauth/token";

/// Vault key holding the current access token.
pub const VAULT_ACCESS_TOKEN: &str = "oauth_access_token";
/// Vault key holding the full token response as JSON.
pub const VAULT_TOKEN_RESPONSE: &str = "oauth_token_response";

/// Random bytes behind a generated `state` value.
const STATE_ENTROPY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("OAuth configuration missing: {0}")]
    MissingConfig(String),

    /// The provider answered the exchange with a non-2xx status.
    #[error("OAuth code exchange failed with {status}: {body}")]
    ExchangeFailed { status: u16, body: String },

    #[error("OAuth request failed: {0}")]
    Request(String),

    #[error("OAuth response was invalid: {0}")]
    InvalidResponse(String),

    #[error("OAuth token storage failed: {0}")]
    Vault(#[from] VaultError),
}

/// Token endpoint response.
///
/// Provider-specific fields beyond the ones named here are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_url: String,
    token_url: String,
    vault: Arc<Vault>,
    http: Client,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        vault: Arc<Vault>,
    ) -> Result<Self, OAuthError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        let redirect_uri = redirect_uri.into();
        for (name, value) in [
            ("OAUTH_CLIENT_ID", &client_id),
            ("OAUTH_CLIENT_SECRET", &client_secret),
            ("OAUTH_REDIRECT_URI", &redirect_uri),
        ] {
            if value.trim().is_empty() {
                return Err(OAuthError::MissingConfig(name.to_string()));
            }
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| OAuthError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            vault,
            http,
        })
    }

    /// Point the client at different provider endpoints.
    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.authorize_url = authorize_url.into();
        self.token_url = token_url.into();
        self
    }

    /// Build the URL the operator opens to grant access.
    ///
    /// A fresh CSRF `state` is generated when none is given. The caller must
    /// compare it with the `state` echoed back on the redirect.
    pub fn build_authorize_url(&self, state: Option<String>) -> Result<(Url, String), OAuthError> {
        let state = match state {
            Some(state) => state,
            None => crypto::random_token(STATE_ENTROPY)
                .map_err(|e| OAuthError::Request(format!("state generation failed: {e}")))?,
        };

        let url = Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("owner", "user"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| OAuthError::MissingConfig(format!("invalid authorize URL: {e}")))?;

        Ok((url, state))
    }

    /// Exchange an authorization code and store the result in the vault.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuthError> {
        let body = json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": self.redirect_uri,
        });

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| OAuthError::Request(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "OAuth code exchange rejected by provider");
            return Err(OAuthError::ExchangeFailed { status, body });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(format!("invalid token response: {e}")))?;

        if tokens.access_token.trim().is_empty() {
            return Err(OAuthError::InvalidResponse(
                "token response did not include access_token".to_string(),
            ));
        }

        self.store_tokens(&tokens)?;
        info!(workspace = ?tokens.workspace_name, "OAuth authorization completed");
        Ok(tokens)
    }

    fn store_tokens(&self, tokens: &TokenResponse) -> Result<(), OAuthError> {
        let raw = serde_json::to_string(tokens)
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
        self.vault.update(|credentials| {
            credentials.insert(VAULT_ACCESS_TOKEN.to_string(), tokens.access_token.clone());
            credentials.insert(VAULT_TOKEN_RESPONSE.to_string(), raw);
        })?;
        Ok(())
    }

    /// Stored access token, `None` if the operator has not authorized yet.
    pub fn current_access_token(&self) -> Result<Option<String>, OAuthError> {
        Ok(self
            .vault
            .get(VAULT_ACCESS_TOKEN)?
            .filter(|token| !token.is_empty()))
    }

    /// Full stored token response, if any.
    pub fn stored_tokens(&self) -> Result<Option<TokenResponse>, OAuthError> {
        match self.vault.get(VAULT_TOKEN_RESPONSE)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| OAuthError::InvalidResponse(e.to_string())),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}
