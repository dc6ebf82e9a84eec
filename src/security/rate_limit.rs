//! Fixed-window rate limiting.
//!
//! # Responsibilities
//! - Count admitted requests per route (optionally per caller) within a
//!   fixed window
//! - Reject with `RateLimitExceeded` once the limit is reached
//! - Refund admitted slots post-dispatch when the route's skip flags say
//!   a response class should not consume quota
//!
//! # Design Decisions
//! - Windows are keyed per route id (plus caller identity when
//!   `per_caller` is set) in a DashMap; racing creators of a fresh window
//!   serialize on the shard lock, so exactly one record survives
//! - Window expiry is lazy: the first request after the reset timestamp
//!   replaces the record in place

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::{GatewayError, GatewayResult};
use crate::routing::route::RateLimitPolicy;

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counters keyed by route id (and optionally caller).
#[derive(Default)]
pub struct RateLimiterRegistry {
    windows: DashMap<String, WindowEntry>,
}

/// Compose the window key for a request.
pub fn window_key(route_id: &str, caller: Option<&str>, policy: &RateLimitPolicy) -> String {
    match (policy.per_caller, caller) {
        (true, Some(caller)) => format!("{route_id}:{caller}"),
        _ => route_id.to_string(),
    }
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject one request against the window for `key`.
    pub fn check(&self, route_id: &str, key: &str, policy: &RateLimitPolicy) -> GatewayResult<()> {
        let now = Instant::now();
        let window = Duration::from_millis(policy.window_ms);

        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| WindowEntry {
            count: 0,
            reset_at: now + window,
        });

        if now >= entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + window;
            return Ok(());
        }

        if entry.count >= policy.limit {
            tracing::warn!(route_id, key, limit = policy.limit, "Rate limit exceeded");
            metrics::counter!("gateway_rate_limited_total", "route" => route_id.to_string())
                .increment(1);
            return Err(GatewayError::RateLimitExceeded {
                route_id: route_id.to_string(),
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Return an admitted slot to the current window. Called by the
    /// pipeline when the response class is configured to be skipped.
    pub fn refund(&self, key: &str) {
        if let Some(mut entry) = self.windows.get_mut(key) {
            if Instant::now() < entry.reset_at {
                entry.count = entry.count.saturating_sub(1);
            }
        }
    }

    /// Drop all windows for a removed route (including per-caller ones).
    pub fn remove_route(&self, route_id: &str) {
        let prefix = format!("{route_id}:");
        self.windows
            .retain(|k, _| k != route_id && !k.starts_with(&prefix));
    }
}
