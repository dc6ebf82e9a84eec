//! Route health tracking: registry of per-route flags plus the active
//! background prober.

pub mod monitor;
pub mod state;

pub use monitor::HealthMonitor;
pub use state::{HealthEvent, HealthRegistry, HealthState};
