// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-client token-bucket rate limiting.
//!
//! Each client id (remote address, device id, ...) owns a bucket holding up
//! to `burst` tokens, refilled continuously at `rate / window` tokens per
//! second. A request costs one token. Token counts are `f64` so partial
//! refills accumulate exactly.
//!
//! At most once per window, buckets that are full again and have been idle
//! for a whole window are evicted. A fresh bucket behaves exactly like a
//! full one, so eviction is invisible to clients.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};

pub const DEFAULT_RATE: u32 = 10;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_BURST: u32 = 15;

/// Bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens added per window
    pub rate: u32,
    pub window_secs: u64,
    /// Bucket ceiling
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            window_secs: DEFAULT_WINDOW_SECS,
            burst: DEFAULT_BURST,
        }
    }
}

/// State of one client's bucket. `0 <= tokens <= burst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBucket {
    pub tokens: f64,
    pub last_refill: DateTime<Utc>,
}

#[derive(Debug)]
struct BucketTable {
    buckets: HashMap<String, RateBucket>,
    last_sweep: DateTime<Utc>,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    table: Mutex<BucketTable>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Zero `rate`, `window_secs` or `burst` are raised to one.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let config = RateLimitConfig {
            rate: config.rate.max(1),
            window_secs: config.window_secs.max(1),
            burst: config.burst.max(1),
        };
        let table = BucketTable {
            buckets: HashMap::new(),
            last_sweep: clock.now(),
        };
        Self {
            config,
            table: Mutex::new(table),
            clock,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Take one token for `client_id` if available.
    ///
    /// The refill clock is updated on denials too, so elapsed time is never
    /// counted twice.
    pub fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now();
        let burst = f64::from(self.config.burst);

        let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        self.sweep(&mut table, now);
        let buckets = &mut table.buckets;
        let Some(bucket) = buckets.get_mut(client_id) else {
            buckets.insert(
                client_id.to_string(),
                RateBucket {
                    tokens: burst - 1.0,
                    last_refill: now,
                },
            );
            return true;
        };

        let tokens = self.refilled(bucket, now);
        let allowed = tokens >= 1.0;
        *bucket = RateBucket {
            tokens: if allowed { tokens - 1.0 } else { tokens },
            last_refill: now,
        };
        drop(table);

        if !allowed {
            info!(client_id, "Rate limit exceeded");
        }
        allowed
    }

    /// Seconds until `client_id` may make its next request; `0.0` if now.
    pub fn retry_after(&self, client_id: &str) -> f64 {
        let now = self.clock.now();
        let table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        let Some(bucket) = table.buckets.get(client_id) else {
            return 0.0;
        };

        let tokens = self.refilled(bucket, now);
        if tokens >= 1.0 {
            0.0
        } else {
            (1.0 - tokens) * self.config.window_secs as f64 / f64::from(self.config.rate)
        }
    }

    /// `retry_after` rounded up to whole seconds, for `Retry-After` headers.
    pub fn retry_after_secs(&self, client_id: &str) -> u64 {
        self.retry_after(client_id).ceil() as u64
    }

    /// Current bucket for `client_id`, without refilling it.
    pub fn bucket(&self, client_id: &str) -> Option<RateBucket> {
        self.table
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .buckets
            .get(client_id)
            .copied()
    }

    /// Number of clients with a live bucket.
    pub fn tracked_clients(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .buckets
            .len()
    }

    fn sweep(&self, table: &mut BucketTable, now: DateTime<Utc>) {
        let window = i64::try_from(self.config.window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        if now - table.last_sweep < window {
            return;
        }
        table.last_sweep = now;

        let burst = f64::from(self.config.burst);
        let before = table.buckets.len();
        table.buckets.retain(|_, bucket| {
            now - bucket.last_refill < window || self.refilled(bucket, now) < burst
        });

        let evicted = before - table.buckets.len();
        if evicted > 0 {
            debug!(evicted, remaining = table.buckets.len(), "Evicted idle rate-limit buckets");
        }
    }

    fn refilled(&self, bucket: &RateBucket, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - bucket.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        let refill = elapsed * f64::from(self.config.rate) / self.config.window_secs as f64;
        (bucket.tokens + refill).min(f64::from(self.config.burst))
    }
}
