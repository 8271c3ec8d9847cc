//! Per-client fixed-window request rate limiting
//!
//! Each client key gets a 60 second window. The first request after the
//! window has elapsed starts a new one. The limit is the global
//! `API_RATE_LIMIT_PER_MINUTE` policy; if the policy cannot be read the
//! built-in default applies.

use super::policy::{PolicyCache, DEFAULT_RATE_LIMIT_PER_MINUTE};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use testshaper_core::Clock;

/// Window length in seconds
pub const WINDOW_SECS: i64 = 60;

/// Request count of one client in its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowCounter {
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests counted in the current window, this one included
    pub count: u32,
    pub limit: u32,
    /// Seconds until the current window closes
    pub reset_in_secs: i64,
}

/// Process-local request rate limiter
pub struct RequestRateLimiter {
    counters: DashMap<String, RateWindowCounter>,
    policy: Arc<PolicyCache>,
    clock: Arc<dyn Clock>,
}

impl RequestRateLimiter {
    pub fn new(policy: Arc<PolicyCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            policy,
            clock,
        }
    }

    /// Count a request from `client_key` and decide whether it may proceed
    pub fn check(&self, client_key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let window = Duration::seconds(WINDOW_SECS);

        let counter = {
            let mut counter = self
                .counters
                .entry(client_key.to_string())
                .or_insert(RateWindowCounter {
                    window_start: now,
                    count: 0,
                });
            if now - counter.window_start > window {
                counter.window_start = now;
                counter.count = 0;
            }
            counter.count = counter.count.saturating_add(1);
            *counter
        };

        let limit = self.limit();
        let reset_in_secs = (counter.window_start + window - now).num_seconds().max(0);
        let allowed = counter.count <= limit;
        if !allowed {
            tracing::debug!(
                "Rate limit exceeded for {} ({}/{})",
                client_key,
                counter.count,
                limit
            );
        }

        RateLimitDecision {
            allowed,
            count: counter.count,
            limit,
            reset_in_secs,
        }
    }

    /// Drop counters whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let window = Duration::seconds(WINDOW_SECS);
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| now - counter.window_start <= window);
        before.saturating_sub(self.counters.len())
    }

    /// Number of tracked clients
    pub fn tracked_clients(&self) -> usize {
        self.counters.len()
    }

    fn limit(&self) -> u32 {
        match self.policy.rate_limit_per_minute(None) {
            Ok(limit) => limit,
            Err(e) => {
                tracing::warn!(
                    "Could not resolve rate limit, using default {}: {}",
                    DEFAULT_RATE_LIMIT_PER_MINUTE,
                    e
                );
                DEFAULT_RATE_LIMIT_PER_MINUTE
            }
        }
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("tracked_clients", &self.counters.len())
            .finish_non_exhaustive()
    }
}
