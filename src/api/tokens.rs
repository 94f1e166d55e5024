// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::error;

use crate::auth::{BearerToken, TokenPair};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

/// `POST /auth/refresh`: exchange a refresh token for a new pair.
///
/// The presented refresh token is revoked, so each one works once.
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let authority = state.authority.clone();
    let pair = task::spawn_blocking(move || authority.rotate_refresh(&request.refresh_token))
        .await
        .map_err(join_failed)??;
    Ok(Json(pair))
}

/// `POST /auth/revoke`: revoke the bearer token itself, even if expired.
pub async fn revoke(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<RevokeResponse>, ApiError> {
    let authority = state.authority.clone();
    task::spawn_blocking(move || authority.revoke(&token))
        .await
        .map_err(join_failed)??;
    Ok(Json(RevokeResponse { revoked: true }))
}

// Revocation writes are fsync'd and run on the blocking pool.
fn join_failed(e: task::JoinError) -> ApiError {
    error!(error = %e, "Token store task failed");
    ApiError::internal("internal error")
}
