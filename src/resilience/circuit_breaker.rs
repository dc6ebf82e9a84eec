//! Per-route circuit breaker.
//!
//! # States
//! - Closed: normal operation, consecutive failures tracked
//! - Open: route assumed down, requests fail fast with `CircuitOpen`
//! - Half-Open: computed lazily once the reset timeout elapses; exactly
//!   one trial call is admitted
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: reset_timeout elapsed since last failure
//! Half-Open → Closed: trial succeeds (failure count resets to 0)
//! Half-Open → Open: trial fails (failure timer refreshed)
//! ```
//!
//! # Design Decisions
//! - One breaker per route, not per upstream instance (a route owns one
//!   logical target and one threshold/timeout configuration)
//! - Half-Open is not stored; it is derived from Open + elapsed time
//! - Concurrent arrivals during a trial are rejected, so exactly one
//!   probe reaches the recovering target

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::{GatewayError, GatewayResult};
use crate::routing::route::BreakerPolicy;

/// Observable breaker state, for introspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerEntry {
    failures: u32,
    last_failure: Option<Instant>,
    open: bool,
    trial_in_flight: bool,
}

/// Failure-tracking state machines keyed by route id.
///
/// Entries are guarded by DashMap's per-shard locks: transitions on one
/// route never contend with traffic on another.
#[derive(Default)]
pub struct BreakerRegistry {
    entries: DashMap<String, BreakerEntry>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate a call through the breaker. `Ok` means the call may proceed
    /// (normal traffic, or the single Half-Open trial).
    pub fn check(&self, route_id: &str, policy: &BreakerPolicy) -> GatewayResult<()> {
        let mut entry = self.entries.entry(route_id.to_string()).or_default();
        if !entry.open {
            return Ok(());
        }

        let elapsed = entry
            .last_failure
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);
        if elapsed >= Duration::from_millis(policy.reset_timeout_ms) && !entry.trial_in_flight {
            entry.trial_in_flight = true;
            tracing::debug!(route_id, "Circuit half-open, admitting trial call");
            return Ok(());
        }

        Err(GatewayError::CircuitOpen {
            route_id: route_id.to_string(),
        })
    }

    /// Record a successful dispatch: resets the failure counter and closes
    /// the breaker (also the Half-Open → Closed transition).
    pub fn record_success(&self, route_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(route_id) {
            if entry.open {
                tracing::info!(route_id, "Circuit closed after successful trial");
            }
            entry.failures = 0;
            entry.open = false;
            entry.trial_in_flight = false;
            entry.last_failure = None;
        }
    }

    /// Record a failed dispatch. Opens the breaker once consecutive
    /// failures reach the threshold; a failed trial refreshes the failure
    /// timer and stays Open.
    pub fn record_failure(&self, route_id: &str, policy: &BreakerPolicy) {
        let mut entry = self.entries.entry(route_id.to_string()).or_default();
        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure = Some(Instant::now());
        entry.trial_in_flight = false;
        if !entry.open && entry.failures >= policy.threshold {
            entry.open = true;
            tracing::warn!(
                route_id,
                failures = entry.failures,
                "Circuit opened"
            );
            metrics::counter!("gateway_breaker_opened_total", "route" => route_id.to_string())
                .increment(1);
        }
    }

    /// Return an admitted trial slot when the gated call ended without an
    /// upstream outcome (cache hit, handler failed before dispatching).
    /// The breaker stays open; the next `check` may admit a fresh trial.
    pub fn release_trial(&self, route_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(route_id) {
            entry.trial_in_flight = false;
        }
    }

    /// Current state, deriving Half-Open lazily from elapsed time.
    pub fn state(&self, route_id: &str, policy: &BreakerPolicy) -> BreakerState {
        match self.entries.get(route_id) {
            None => BreakerState::Closed,
            Some(entry) if !entry.open => BreakerState::Closed,
            Some(entry) => {
                let elapsed = entry
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= Duration::from_millis(policy.reset_timeout_ms) {
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open
                }
            }
        }
    }

    /// Drop all state for a removed route.
    pub fn remove(&self, route_id: &str) {
        self.entries.remove(route_id);
    }
}
