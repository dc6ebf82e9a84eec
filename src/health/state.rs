//! Route health state.
//!
//! # Design Decisions
//! - Written only by the health monitor, read by anything that wants to
//!   short-circuit unhealthy targets (load-balancing extension point)
//! - Routes that have never been probed are treated as healthy
//! - State changes logged for observability

use std::time::Instant;

use dashmap::DashMap;

/// Health snapshot for one route.
#[derive(Debug, Clone, Copy)]
pub struct HealthState {
    pub healthy: bool,
    pub last_probe: Option<Instant>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: true,
            last_probe: None,
        }
    }
}

/// Notification emitted when a probe finds a route unhealthy.
#[derive(Debug, Clone)]
pub struct HealthEvent {
    pub route_id: String,
    pub target: String,
    pub reason: String,
}

/// Per-route health flags keyed by route id.
#[derive(Default)]
pub struct HealthRegistry {
    states: DashMap<String, HealthState>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, route_id: &str) -> HealthState {
        self.states
            .get(route_id)
            .map(|s| *s)
            .unwrap_or_default()
    }

    pub fn is_healthy(&self, route_id: &str) -> bool {
        self.get(route_id).healthy
    }

    /// Record a probe result. Returns the previous healthy flag so the
    /// monitor can log transitions.
    pub fn record_probe(&self, route_id: &str, healthy: bool) -> bool {
        let mut entry = self.states.entry(route_id.to_string()).or_default();
        let was_healthy = entry.healthy;
        entry.healthy = healthy;
        entry.last_probe = Some(Instant::now());
        was_healthy
    }

    pub fn remove(&self, route_id: &str) {
        self.states.remove(route_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprobed_routes_are_healthy() {
        let reg = HealthRegistry::new();
        assert!(reg.is_healthy("never-seen"));
        assert!(reg.get("never-seen").last_probe.is_none());
    }

    #[test]
    fn test_probe_transitions() {
        let reg = HealthRegistry::new();
        assert!(reg.record_probe("r1", false));
        assert!(!reg.is_healthy("r1"));
        assert!(!reg.record_probe("r1", true));
        assert!(reg.is_healthy("r1"));
        assert!(reg.get("r1").last_probe.is_some());

        reg.remove("r1");
        assert!(reg.get("r1").last_probe.is_none());
    }
}
