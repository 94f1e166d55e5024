// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook router.
//!
//! | Route | Rate limited | Auth |
//! |-------|--------------|------|
//! | `GET /` | no | none |
//! | `GET /health` | no | none |
//! | `POST /export` | yes | access token with `export:create` |
//! | `POST /auth/refresh` | yes | refresh token in body |
//! | `POST /auth/revoke` | yes | the bearer token being revoked |

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::state::AppState;

pub mod export;
pub mod health;
pub mod outbox;
pub mod tokens;

pub use export::{ExportSink, SinkError, ValidatedExport};
pub use outbox::OutboxSink;

/// Client id for requests without a peer address (e.g. in-process tests).
const UNKNOWN_CLIENT: &str = "unknown";

pub fn router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/export", post(export::export))
        .route("/auth/refresh", post(tokens::refresh))
        .route("/auth/revoke", post(tokens::revoke))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/", get(health::info))
        .route("/health", get(health::health))
        .merge(limited)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Reject with 429 once the peer's bucket is empty.
async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client_id = client_id(&request);
    if !state.rate_limiter.allow(&client_id) {
        let retry_after = state.rate_limiter.retry_after_secs(&client_id).max(1);
        return Err(ApiError::too_many_requests(retry_after));
    }
    Ok(next.run(request).await)
}

fn client_id(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::api::export::{ExportReceipt, ExportSource};
    use crate::auth::{Scope, ScopeSet};
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::state::test_support::test_state;

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<ValidatedExport>>,
    }

    #[async_trait]
    impl ExportSink for RecordingSink {
        async fn export(&self, export: ValidatedExport) -> Result<ExportReceipt, SinkError> {
            self.received.lock().unwrap().push(export);
            Ok(ExportReceipt {
                title: "Recorded".to_string(),
            })
        }
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, retry_after, body)
    }

    fn access_token(state: &AppState, scopes: ScopeSet) -> String {
        state
            .authority
            .issue_access_token("shortcuts", Uuid::new_v4(), scopes, None)
            .unwrap()
    }

    #[tokio::test]
    async fn info_and_health_are_public() {
        let (state, _dir) = test_state();
        let app = router(state);

        let (status, _, body) =
            send(&app, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "online");

        let (status, _, body) =
            send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["sink"], "missing");
    }

    #[tokio::test]
    async fn export_requires_bearer_token() {
        let (state, _dir) = test_state();
        let app = router(state);

        let (status, _, body) = send(&app, post_json("/export", None, json!({ "source": "q" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "unauthorized" }));

        let (status, _, _) =
            send(&app, post_json("/export", Some("not-a-jwt"), json!({ "source": "q" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn export_requires_scope() {
        let (state, _dir) = test_state();
        let token = access_token(&state, ScopeSet::from([Scope::ExportRead]));
        let app = router(state);

        let (status, _, body) =
            send(&app, post_json("/export", Some(&token), json!({ "source": "q" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn valid_export_reaches_sink() {
        let (state, _dir) = test_state();
        let sink = Arc::new(RecordingSink::default());
        let state = state.with_sink(sink.clone());
        let token = access_token(&state, ScopeSet::from([Scope::ExportCreate]));
        let app = router(state);

        let (status, _, body) = send(
            &app,
            post_json(
                "/export",
                Some(&token),
                json!({ "content": { "title": "<b>T</b>", "content": "x" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "success");
        assert_eq!(body["title"], "Recorded");

        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].subject, "shortcuts");
        let ExportSource::Content(content) = &received[0].source else {
            panic!("expected content source");
        };
        assert_eq!(content.title, "&lt;b&gt;T&lt;/b&gt;");
    }

    #[tokio::test]
    async fn export_without_sink_is_unavailable() {
        let (state, _dir) = test_state();
        let token = access_token(&state, ScopeSet::from([Scope::ExportCreate]));
        let app = router(state);

        let (status, _, _) =
            send(&app, post_json("/export", Some(&token), json!({ "source": "q" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn rejected_url_never_reaches_sink() {
        let (state, _dir) = test_state();
        let sink = Arc::new(RecordingSink::default());
        let state = state.with_sink(sink.clone());
        let token = access_token(&state, ScopeSet::from([Scope::ExportCreate]));
        let app = router(state);

        let (status, _, _) = send(
            &app,
            post_json(
                "/export",
                Some(&token),
                json!({ "source": "https://169.254.169.254/latest/meta-data" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_returns_retry_after() {
        let (mut state, _dir) = test_state();
        state.rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            rate: 1,
            window_secs: 60,
            burst: 1,
        }));
        let app = router(state);

        let (status, _, _) = send(&app, post_json("/auth/revoke", None, json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, retry_after, body) =
            send(&app, post_json("/auth/revoke", None, json!({}))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "rate limit exceeded");
        let secs: u64 = retry_after.unwrap().parse().unwrap();
        assert!((1..=60).contains(&secs));

        // Health is not rate limited.
        let (status, _, _) =
            send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
        assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_reuse() {
        let (state, _dir) = test_state();
        let refresh = state
            .authority
            .issue_refresh_token("shortcuts", Uuid::new_v4(), None)
            .unwrap();
        let app = router(state);

        let (status, _, body) = send(
            &app,
            post_json("/auth/refresh", None, json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert!(body["access_token"].as_str().is_some());

        let (status, _, _) = send(
            &app,
            post_json("/auth/refresh", None, json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn revoked_token_is_rejected_afterwards() {
        let (state, _dir) = test_state();
        let sink = Arc::new(RecordingSink::default());
        let state = state.with_sink(sink);
        let token = access_token(&state, ScopeSet::from([Scope::ExportCreate]));
        let app = router(state);

        let (status, _, body) = send(&app, post_json("/auth/revoke", Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revoked"], true);

        let (status, _, _) =
            send(&app, post_json("/export", Some(&token), json!({ "source": "q" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
