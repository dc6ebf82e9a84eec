//! Retry eligibility decisions.
//!
//! # Design Decisions
//! - Only idempotent methods are ever retried; blind retries of POST/PATCH
//!   are a correctness hazard, so non-idempotent routes get one attempt
//!   regardless of their configured retry count
//! - Connection errors and timeouts are always retryable (for idempotent
//!   methods); among statuses only the gateway-class 5xx family is
//! - Retries within one dispatch are sequential with jittered backoff

/// Methods safe to replay against an upstream.
pub fn is_idempotent(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "OPTIONS" | "PUT" | "DELETE" | "TRACE"
    )
}

/// Should a proxy attempt be retried, given the method and what happened?
/// `status` is `None` for connection-level failures (which includes
/// timeouts), `Some` for a response that arrived.
pub fn is_retryable(method: &str, status: Option<u16>) -> bool {
    if !is_idempotent(method) {
        return false;
    }
    match status {
        None => true,
        Some(502) | Some(503) | Some(504) => true,
        Some(_) => false,
    }
}
