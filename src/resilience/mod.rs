//! Resilience primitives: circuit breaking, retry eligibility, backoff.

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{BreakerRegistry, BreakerState};
