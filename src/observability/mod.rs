//! Metrics and telemetry plumbing.

pub mod metrics;
pub mod telemetry;

pub use metrics::{MetricsAggregate, MetricsSnapshot};
pub use telemetry::{LogTelemetrySink, MetricsCollector, TelemetrySink};
