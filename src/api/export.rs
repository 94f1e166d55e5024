// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `POST /export`: authenticate, validate, then hand off to the sink.
//!
//! Fetching research content and writing the destination document are done
//! by an [`ExportSink`]. This handler only guarantees that whatever reaches
//! the sink has passed every check.

use async_trait::async_trait;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{Auth, Scope};
use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{
    sanitize_export_content, sanitize_text, validate_content_blocks, ExportContent,
    MAX_TEXT_LENGTH,
};

/// Longest destination id accepted.
const MAX_DESTINATION_ID_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    #[default]
    Database,
    Page,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    /// Thread URL or free-text query
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination_id: Option<String>,
    #[serde(default)]
    pub destination_type: DestinationType,
    /// Content supplied directly instead of fetched
    #[serde(default)]
    pub content: Option<ExportContent>,
    #[serde(default)]
    pub blocks: Vec<Value>,
}

/// Where the content comes from, after validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ExportSource {
    /// Allow-listed URL whose host resolved to public addresses only
    Url(String),
    /// Sanitized search query
    Query(String),
    /// Caller-supplied content, sanitized
    Content(ExportContent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Destination {
    pub id: String,
    pub kind: DestinationType,
}

/// An export that passed authentication and validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedExport {
    pub subject: String,
    pub device_id: Uuid,
    pub source: ExportSource,
    /// `None` means the sink's saved default
    pub destination: Option<Destination>,
    pub blocks: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReceipt {
    pub title: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("no destination specified and no default saved")]
    NoDestination,

    #[error("content could not be retrieved: {0}")]
    FetchFailed(String),

    #[error("export failed: {0}")]
    WriteFailed(String),
}

/// Fetches content and writes it to the destination document.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn export(&self, export: ValidatedExport) -> Result<ExportReceipt, SinkError>;
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub title: String,
}

pub async fn export(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, ApiError> {
    claims.require(&[Scope::ExportCreate])?;

    let validated = validate_request(&state, request, &claims.sub, claims.device_id).await?;
    info!(
        subject = %validated.subject,
        source = source_kind(&validated.source),
        blocks = validated.blocks.len(),
        "Export request accepted"
    );

    let Some(sink) = state.sink.as_ref() else {
        return Err(ApiError::service_unavailable("export backend is not configured"));
    };

    match sink.export(validated).await {
        Ok(receipt) => Ok(Json(ExportResponse {
            status: "success",
            message: "content exported",
            title: receipt.title,
        })),
        Err(SinkError::NoDestination) => Err(ApiError::bad_request(
            SinkError::NoDestination.to_string(),
        )),
        Err(e) => {
            error!(error = %e, "Export sink failed");
            Err(ApiError::internal("export failed"))
        }
    }
}

/// Run every request-safety check and build the hand-off value.
pub async fn validate_request(
    state: &AppState,
    request: ExportRequest,
    subject: &str,
    device_id: Uuid,
) -> Result<ValidatedExport, ApiError> {
    let source = match (request.content, request.source) {
        (Some(content), _) => {
            ExportSource::Content(sanitize_export_content(content, &state.url_validator))
        }
        (None, Some(source)) if looks_like_url(&source) => {
            let result = state.url_validator.validate_and_resolve(&source).await;
            if let Some(err) = result.error {
                warn!(kind = err.kind(), "Rejected export source URL");
                return Err(err.into());
            }
            ExportSource::Url(source.trim().to_string())
        }
        (None, Some(query)) => {
            let query = sanitize_text(query.trim(), MAX_TEXT_LENGTH);
            if query.is_empty() {
                return Err(ApiError::bad_request("source is empty"));
            }
            ExportSource::Query(query)
        }
        (None, None) => {
            return Err(ApiError::bad_request(
                "either \"source\" or \"content\" must be provided",
            ))
        }
    };

    let destination = request
        .destination_id
        .map(|id| check_destination_id(&id).map(|id| Destination {
            id,
            kind: request.destination_type,
        }))
        .transpose()?;

    let (result, blocks) = validate_content_blocks(&request.blocks, &state.url_validator);
    if let Some(err) = result.error {
        warn!(kind = err.kind(), "Rejected export blocks");
        return Err(err.into());
    }

    Ok(ValidatedExport {
        subject: subject.to_string(),
        device_id,
        source,
        destination,
        blocks,
    })
}

/// Destination ids are opaque identifiers: letters, digits and dashes.
fn check_destination_id(id: &str) -> Result<String, ApiError> {
    let id = id.trim();
    let well_formed = !id.is_empty()
        && id.len() <= MAX_DESTINATION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !well_formed {
        return Err(ApiError::bad_request("invalid destination_id"));
    }
    Ok(id.to_string())
}

fn source_kind(source: &ExportSource) -> &'static str {
    match source {
        ExportSource::Url(_) => "url",
        ExportSource::Query(_) => "query",
        ExportSource::Content(_) => "content",
    }
}

/// Sources with an http(s) scheme are URLs; anything else is a query.
fn looks_like_url(source: &str) -> bool {
    let source = source.trim_start().to_ascii_lowercase();
    source.starts_with("https://") || source.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use serde_json::json;

    fn request(value: Value) -> ExportRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn query_source_is_sanitized() {
        let (state, _dir) = test_state();
        let validated = validate_request(
            &state,
            request(json!({ "source": "  what is <b>rust</b>?  " })),
            "shortcuts",
            Uuid::nil(),
        )
        .await
        .unwrap();

        assert_eq!(
            validated.source,
            ExportSource::Query("what is &lt;b&gt;rust&lt;/b&gt;?".to_string())
        );
        assert_eq!(validated.destination, None);
    }

    #[tokio::test]
    async fn query_starting_with_http_is_not_a_url() {
        let (state, _dir) = test_state();
        let validated = validate_request(
            &state,
            request(json!({ "source": "http status codes" })),
            "shortcuts",
            Uuid::nil(),
        )
        .await
        .unwrap();
        assert_eq!(
            validated.source,
            ExportSource::Query("http status codes".to_string())
        );

        let err = validate_request(
            &state,
            request(json!({ "source": "HTTP://www.perplexity.ai/search/x" })),
            "shortcuts",
            Uuid::nil(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn content_takes_precedence_over_source() {
        let (state, _dir) = test_state();
        let validated = validate_request(
            &state,
            request(json!({
                "source": "ignored",
                "content": { "title": "<i>T</i>", "content": "body" },
                "destination_id": "abc-123",
                "destination_type": "page"
            })),
            "shortcuts",
            Uuid::nil(),
        )
        .await
        .unwrap();

        let ExportSource::Content(content) = validated.source else {
            panic!("expected content source");
        };
        assert_eq!(content.title, "&lt;i&gt;T&lt;/i&gt;");
        assert_eq!(
            validated.destination,
            Some(Destination {
                id: "abc-123".to_string(),
                kind: DestinationType::Page,
            })
        );
    }

    #[tokio::test]
    async fn disallowed_url_source_is_unprocessable() {
        let (state, _dir) = test_state();
        let err = validate_request(
            &state,
            request(json!({ "source": "https://evil.example/search" })),
            "shortcuts",
            Uuid::nil(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn missing_source_and_content_is_bad_request() {
        let (state, _dir) = test_state();
        let err = validate_request(&state, request(json!({})), "s", Uuid::nil())
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn destination_id_must_be_opaque() {
        let (state, _dir) = test_state();
        let too_long = "a".repeat(MAX_DESTINATION_ID_LEN + 1);
        for id in ["", "../../etc", "id; rm -rf /", too_long.as_str()] {
            let err = validate_request(
                &state,
                request(json!({ "source": "query", "destination_id": id })),
                "s",
                Uuid::nil(),
            )
            .await
            .unwrap_err();
            assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST, "{id}");
        }
    }

    #[tokio::test]
    async fn invalid_blocks_are_rejected() {
        let (state, _dir) = test_state();
        let err = validate_request(
            &state,
            request(json!({ "source": "query", "blocks": [{ "type": "script" }] })),
            "s",
            Uuid::nil(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
