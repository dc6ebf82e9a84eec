//! Engine configuration schema.
//!
//! Route definitions come from the external route source at runtime;
//! this module only covers engine-level knobs. All types derive Serde
//! traits for deserialization from whatever carrier the bootstrap uses.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Inbound listener settings.
    pub listener: ListenerConfig,

    /// Background health monitor settings.
    pub health_monitor: HealthMonitorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Inbound request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Health monitor scheduling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    /// Enable the background prober.
    pub enabled: bool,

    /// Monitor tick interval in seconds. Individual routes may declare a
    /// slower cadence; they are skipped until their own interval elapses.
    pub interval_secs: u64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,

    /// Telemetry snapshot flush interval in seconds.
    pub flush_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            flush_interval_secs: 30,
        }
    }
}
