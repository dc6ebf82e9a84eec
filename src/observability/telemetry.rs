//! Telemetry sink and the periodic collection task.
//!
//! Everything here is fire-and-forget: a misbehaving sink can slow
//! nothing down and fail no request.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};

use crate::health::HealthEvent;
use crate::observability::metrics::{MetricsAggregate, MetricsSnapshot};

/// External telemetry receiver: periodic metrics snapshots plus discrete
/// route-unhealthy events.
pub trait TelemetrySink: Send + Sync {
    fn record_snapshot(&self, snapshot: MetricsSnapshot);
    fn route_unhealthy(&self, event: &HealthEvent);
}

/// Sink that just logs, for deployments without an external receiver.
#[derive(Default)]
pub struct LogTelemetrySink;

impl TelemetrySink for LogTelemetrySink {
    fn record_snapshot(&self, snapshot: MetricsSnapshot) {
        tracing::debug!(
            uptime_secs = snapshot.uptime_secs,
            routes = snapshot.routes.len(),
            "Metrics snapshot collected"
        );
    }

    fn route_unhealthy(&self, event: &HealthEvent) {
        tracing::warn!(route_id = %event.route_id, target = %event.target, reason = %event.reason, "Route unhealthy");
    }
}

/// Background task flushing aggregate snapshots to the sink on a fixed
/// interval and forwarding health events as they arrive.
pub struct MetricsCollector {
    aggregate: Arc<MetricsAggregate>,
    sink: Arc<dyn TelemetrySink>,
    flush_interval: Duration,
}

impl MetricsCollector {
    pub fn new(
        aggregate: Arc<MetricsAggregate>,
        sink: Arc<dyn TelemetrySink>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            aggregate,
            sink,
            flush_interval,
        }
    }

    pub async fn run(
        self,
        mut health_events: mpsc::Receiver<HealthEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            flush_secs = self.flush_interval.as_secs(),
            "Metrics collector starting"
        );

        let mut ticker = time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sink.record_snapshot(self.aggregate.snapshot());
                }
                Some(event) = health_events.recv() => {
                    self.sink.route_unhealthy(&event);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Metrics collector received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
