//! Proxy-route dispatch: target URL construction and the retrying
//! upstream call.
//!
//! # Design Decisions
//! - Route-level static query parameters and headers override the
//!   request's own on conflict
//! - Retries are sequential with jittered exponential backoff, and only
//!   for idempotent methods; a route configured with zero retries gets
//!   exactly one attempt
//! - Upstream responses pass through with their own status; only
//!   connection-class failures and timeouts become errors

use std::collections::BTreeMap;
use std::collections::HashMap;

use url::Url;

use crate::context::{RequestContext, ResponseContext};
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::retries::is_retryable;
use crate::routing::matcher;
use crate::routing::route::Route;
use crate::upstream::{UpstreamClient, UpstreamFailure, UpstreamRequest};

const RETRY_BASE_DELAY_MS: u64 = 100;
const RETRY_MAX_DELAY_MS: u64 = 2_000;

/// Build the upstream URL for a proxy dispatch: substitute `:param`
/// bindings into the target path, append the wildcard remainder, and
/// merge query parameters (route statics win).
pub fn build_target_url(route: &Route, ctx: &RequestContext) -> GatewayResult<String> {
    let mut url = Url::parse(&route.target).map_err(|e| GatewayError::InvalidRouteType {
        route_id: route.id.clone(),
        message: format!("invalid target '{}': {e}", route.target),
    })?;

    let mut path = url.path().to_string();
    for (name, value) in &ctx.path_params {
        path = path.replace(&format!(":{name}"), value);
    }
    if let Some(remainder) = matcher::wildcard_remainder(&ctx.path, &route.path) {
        if !remainder.is_empty() {
            path = format!("{}/{}", path.trim_end_matches('/'), remainder);
        }
    }
    url.set_path(&path);

    // BTreeMap keeps the merged query deterministic.
    let mut query: BTreeMap<&str, &str> = ctx
        .query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    for (k, v) in &route.config.query {
        query.insert(k.as_str(), v.as_str());
    }
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }

    Ok(url.to_string())
}

/// Merge the inbound headers with the route's static injections. The host
/// header is dropped so the client derives it from the target URL.
pub fn merge_headers(route: &Route, ctx: &RequestContext) -> HashMap<String, String> {
    let mut headers = ctx.headers.clone();
    headers.remove("host");
    for (name, value) in &route.config.headers {
        headers.insert(name.to_lowercase(), value.clone());
    }
    headers
}

/// Dispatch to the upstream with the route's timeout and retry budget.
pub async fn dispatch(
    client: &dyn UpstreamClient,
    route: &Route,
    ctx: &RequestContext,
    body: Option<axum::body::Bytes>,
) -> GatewayResult<ResponseContext> {
    let url = build_target_url(route, ctx)?;
    let headers = merge_headers(route, ctx);
    let timeout = std::time::Duration::from_millis(route.config.timeout_ms);
    let max_attempts = route.config.retries + 1;

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let request = UpstreamRequest {
            method: ctx.method.clone(),
            url: url.clone(),
            headers: headers.clone(),
            body: body.clone(),
            timeout,
        };

        match client.send(request).await {
            Ok(response) => {
                if attempt < max_attempts && is_retryable(&ctx.method, Some(response.status)) {
                    let delay = calculate_backoff(attempt, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS);
                    tracing::info!(
                        route_id = %route.id,
                        attempt,
                        status = response.status,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                let mut resp = ResponseContext::new(response.status);
                resp.headers = response.headers;
                if !response.body.is_empty() {
                    resp = resp.with_body(response.body);
                }
                return Ok(resp);
            }
            Err(failure) => {
                if attempt < max_attempts && is_retryable(&ctx.method, None) {
                    let delay = calculate_backoff(attempt, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS);
                    tracing::info!(
                        route_id = %route.id,
                        attempt,
                        failure = ?failure,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after upstream failure"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(match failure {
                    UpstreamFailure::Timeout => GatewayError::UpstreamTimeout {
                        route_id: route.id.clone(),
                        timeout_ms: route.config.timeout_ms,
                    },
                    UpstreamFailure::Connection(message) => GatewayError::UpstreamError {
                        route_id: route.id.clone(),
                        message,
                    },
                });
            }
        }
    }
}
