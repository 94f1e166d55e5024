// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File-backed [`ExportSink`].
//!
//! Each validated export is written as one owner-only JSON file under
//! `outbox/`, for the document writer to pick up. Writes are atomic, so the
//! writer never sees a partial entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::export::{ExportReceipt, ExportSink, ExportSource, SinkError, ValidatedExport};
use crate::storage::SecureStorage;

#[derive(Debug, Serialize)]
struct OutboxEntry<'a> {
    id: Uuid,
    queued_at: DateTime<Utc>,
    #[serde(flatten)]
    export: &'a ValidatedExport,
}

#[derive(Debug, Clone)]
pub struct OutboxSink {
    storage: SecureStorage,
}

impl OutboxSink {
    pub fn new(storage: SecureStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ExportSink for OutboxSink {
    async fn export(&self, export: ValidatedExport) -> Result<ExportReceipt, SinkError> {
        let id = Uuid::new_v4();
        let title = match &export.source {
            ExportSource::Content(content) if !content.title.is_empty() => content.title.clone(),
            ExportSource::Content(_) => "Untitled".to_string(),
            ExportSource::Url(url) => url.clone(),
            ExportSource::Query(query) => query.clone(),
        };

        let entry = OutboxEntry {
            id,
            queued_at: Utc::now(),
            export: &export,
        };
        let path = self.storage.paths().outbox_entry(&id.to_string());
        let storage = self.storage.clone();
        let bytes =
            serde_json::to_vec_pretty(&entry).map_err(|e| SinkError::WriteFailed(e.to_string()))?;

        tokio::task::spawn_blocking(move || storage.write_raw(&path, &bytes))
            .await
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;

        info!(%id, "Export queued in outbox");
        Ok(ExportReceipt { title })
    }
}
