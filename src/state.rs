// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::api::export::ExportSink;
use crate::auth::TokenAuthority;
use crate::rate_limit::RateLimiter;
use crate::validation::UrlValidator;

#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<TokenAuthority>,
    pub rate_limiter: Arc<RateLimiter>,
    pub url_validator: Arc<UrlValidator>,
    /// `None` until an export backend is attached; `/export` answers 503.
    pub sink: Option<Arc<dyn ExportSink>>,
}

impl AppState {
    pub fn new(
        authority: TokenAuthority,
        rate_limiter: RateLimiter,
        url_validator: UrlValidator,
    ) -> Self {
        Self {
            authority: Arc::new(authority),
            rate_limiter: Arc::new(rate_limiter),
            url_validator: Arc::new(url_validator),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}
