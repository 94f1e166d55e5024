// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

/// `GET /` response.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

/// Health check response with individual component status.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: &'static str,
    pub ready: bool,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Whether an export backend is attached.
    pub sink: &'static str,
    /// Number of revoked tokens currently tracked.
    pub revoked_tokens: usize,
}

pub async fn info() -> Json<InfoResponse> {
    let endpoints = BTreeMap::from([
        ("GET /", "This information"),
        ("GET /health", "Health check"),
        ("POST /export", "Export content (bearer token, export:create)"),
        ("POST /auth/refresh", "Exchange a refresh token for a new token pair"),
        ("POST /auth/revoke", "Revoke the presented bearer token"),
    ]);
    Json(InfoResponse {
        status: "online",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints,
    })
}

/// Returns 200 when exports can be served, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.sink.is_some();
    let response = HealthResponse {
        status: if ready { "healthy" } else { "degraded" },
        ready,
        checks: HealthChecks {
            sink: if ready { "ok" } else { "missing" },
            revoked_tokens: state.authority.revocations().len(),
        },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
