//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_cache_hits_total` (counter): cache adapter hits
//! - `gateway_rate_limited_total` (counter): rejected by the limiter
//! - `gateway_breaker_opened_total` (counter): breaker open transitions
//! - `gateway_route_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Exposition goes through the `metrics` facade; the Prometheus
//!   exporter is installed by the binary only
//! - A per-route in-process aggregate backs the periodic telemetry
//!   snapshots independently of the exporter

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;

/// Install the Prometheus exporter on `addr`. Called once at startup by
/// the binary; failures are logged and metrics become no-ops.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one dispatched request against both the exporter and the
/// in-process aggregate.
pub fn record_request(
    aggregate: &MetricsAggregate,
    route_id: &str,
    method: &str,
    status: u16,
    duration: Duration,
    size: usize,
) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route_id.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "route" => route_id.to_string(),
    )
    .record(duration.as_secs_f64());

    aggregate.record(route_id, status, duration, size);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RouteStats {
    pub requests: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub bytes_out: u64,
}

/// Periodic metrics snapshot handed to the telemetry sink.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub routes: Vec<(String, RouteStats)>,
}

/// Per-route aggregate counters, shared between the request path and the
/// metrics-collection task.
pub struct MetricsAggregate {
    stats: DashMap<String, RouteStats>,
    started_at: Instant,
}

impl Default for MetricsAggregate {
    fn default() -> Self {
        Self {
            stats: DashMap::new(),
            started_at: Instant::now(),
        }
    }
}

impl MetricsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, route_id: &str, status: u16, duration: Duration, size: usize) {
        let mut entry = self.stats.entry(route_id.to_string()).or_default();
        entry.requests += 1;
        if status >= 400 {
            entry.failures += 1;
        }
        entry.total_duration_ms += duration.as_millis() as u64;
        entry.bytes_out += size as u64;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            routes: self
                .stats
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
        }
    }

    pub fn route_stats(&self, route_id: &str) -> Option<RouteStats> {
        self.stats.get(route_id).map(|r| r.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_counts() {
        let agg = MetricsAggregate::new();
        agg.record("r1", 200, Duration::from_millis(10), 100);
        agg.record("r1", 502, Duration::from_millis(20), 0);
        agg.record("r2", 200, Duration::from_millis(5), 50);

        let r1 = agg.route_stats("r1").unwrap();
        assert_eq!(r1.requests, 2);
        assert_eq!(r1.failures, 1);
        assert_eq!(r1.total_duration_ms, 30);
        assert_eq!(r1.bytes_out, 100);

        let snap = agg.snapshot();
        assert_eq!(snap.routes.len(), 2);
    }
}
