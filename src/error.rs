//! Gateway error definitions.
//!
//! Every failure the dispatch pipeline can produce is a `GatewayError`
//! variant carrying enough route context for the outer translation layer
//! to render it. Health-probe and telemetry failures are never surfaced
//! through this type; they are logged and swallowed at their source.

use thiserror::Error;

/// Errors produced while dispatching a request through the engine.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No configured route matched the request.
    #[error("no route matched {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// Route requires authentication but no principal was resolved.
    #[error("authentication required for route {route_id}")]
    AuthenticationRequired { route_id: String },

    /// Principal lacks every role/scope the route demands.
    #[error("insufficient permissions for route {route_id}")]
    InsufficientPermissions { route_id: String },

    /// Fixed-window rate limit exhausted for this route.
    #[error("rate limit exceeded for route {route_id}")]
    RateLimitExceeded { route_id: String },

    /// Circuit breaker is open; request failed fast without dispatch.
    #[error("circuit open for route {route_id}")]
    CircuitOpen { route_id: String },

    /// Upstream call exceeded the route's configured timeout.
    #[error("upstream timeout after {timeout_ms}ms on route {route_id}")]
    UpstreamTimeout { route_id: String, timeout_ms: u64 },

    /// Upstream connection failed or returned an unusable response.
    #[error("upstream error on route {route_id}: {message}")]
    UpstreamError { route_id: String, message: String },

    /// A request/response transformer failed or could not be resolved.
    #[error("transformation failed on route {route_id}: {message}")]
    Transformation { route_id: String, message: String },

    /// Route configuration names a type/handler the engine cannot serve.
    #[error("invalid route configuration for {route_id}: {message}")]
    InvalidRouteType { route_id: String, message: String },
}

impl GatewayError {
    /// Default HTTP status for each error kind.
    ///
    /// Proxy routes pass upstream statuses through at the response level,
    /// so `UpstreamError` here covers only connection-class failures.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::RouteNotFound { .. } => 404,
            GatewayError::AuthenticationRequired { .. } => 401,
            GatewayError::InsufficientPermissions { .. } => 403,
            GatewayError::RateLimitExceeded { .. } => 429,
            GatewayError::CircuitOpen { .. } => 503,
            GatewayError::UpstreamTimeout { .. } => 504,
            GatewayError::UpstreamError { .. } => 502,
            GatewayError::Transformation { .. } => 500,
            GatewayError::InvalidRouteType { .. } => 400,
        }
    }

    /// Route id the error is attributed to, if any.
    pub fn route_id(&self) -> Option<&str> {
        match self {
            GatewayError::RouteNotFound { .. } => None,
            GatewayError::AuthenticationRequired { route_id }
            | GatewayError::InsufficientPermissions { route_id }
            | GatewayError::RateLimitExceeded { route_id }
            | GatewayError::CircuitOpen { route_id }
            | GatewayError::UpstreamTimeout { route_id, .. }
            | GatewayError::UpstreamError { route_id, .. }
            | GatewayError::Transformation { route_id, .. }
            | GatewayError::InvalidRouteType { route_id, .. } => Some(route_id),
        }
    }
}

/// Result type for engine operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
