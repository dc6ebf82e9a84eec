//! Request admission gates: authentication enforcement and rate limiting.

pub mod access_control;
pub mod rate_limit;

pub use rate_limit::RateLimiterRegistry;
