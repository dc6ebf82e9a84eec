//! Dispatch pipeline.
//!
//! # Responsibilities
//! - Orchestrate one request end to end: route match, auth gate, rate
//!   limit, circuit breaker, cache lookup, type handler, cache write,
//!   breaker bookkeeping, metrics
//! - Own the five route-type handlers (proxy, redirect, function, mock,
//!   webhook)
//!
//! # Design Decisions
//! - Gate rejections (auth/rate-limit/breaker) never reach the handler
//!   and are never retried here
//! - Breaker accounting covers only upstream outcomes: timeouts,
//!   connection errors, and 502/503/504 passthrough statuses count as
//!   failures; transformation errors outside the upstream call do not
//! - Rate-limit slots are refunded post-dispatch when the route's skip
//!   flags exclude the observed response class from quota

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, ResponseCache};
use crate::context::{RequestContext, ResponseContext};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics::{record_request, MetricsAggregate};
use crate::resilience::BreakerRegistry;
use crate::routing::matcher;
use crate::routing::route::{Route, RouteType};
use crate::routing::RouteRegistry;
use crate::security::rate_limit::window_key;
use crate::security::{access_control, RateLimiterRegistry};
use crate::transform::{Direction, FunctionRegistry, TransformRegistry};
use crate::upstream::{UpstreamClient, UpstreamRequest};

use super::proxy;

/// Orchestrates dispatch across the shared registries.
pub struct Dispatcher {
    routes: Arc<RouteRegistry>,
    breakers: Arc<BreakerRegistry>,
    limiters: Arc<RateLimiterRegistry>,
    transforms: Arc<TransformRegistry>,
    functions: Arc<FunctionRegistry>,
    cache: ResponseCache,
    client: Arc<dyn UpstreamClient>,
    metrics: Arc<MetricsAggregate>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        routes: Arc<RouteRegistry>,
        breakers: Arc<BreakerRegistry>,
        limiters: Arc<RateLimiterRegistry>,
        transforms: Arc<TransformRegistry>,
        functions: Arc<FunctionRegistry>,
        cache: ResponseCache,
        client: Arc<dyn UpstreamClient>,
        metrics: Arc<MetricsAggregate>,
    ) -> Self {
        Self {
            routes,
            breakers,
            limiters,
            transforms,
            functions,
            cache,
            client,
            metrics,
        }
    }

    /// Run one request through the pipeline.
    pub async fn dispatch(&self, mut ctx: RequestContext) -> GatewayResult<ResponseContext> {
        let route = self
            .routes
            .find_route(&ctx.path, &ctx.method, ctx.tenant_id.as_deref())
            .ok_or_else(|| GatewayError::RouteNotFound {
                method: ctx.method.clone(),
                path: ctx.path.clone(),
            })
            .map_err(|err| {
                record_request(
                    &self.metrics,
                    "unmatched",
                    &ctx.method,
                    err.status_code(),
                    ctx.received_at.elapsed(),
                    0,
                );
                err
            })?;

        ctx.path_params = matcher::extract_path_params(&ctx.path, &route.path);
        ctx.route = Some(route.clone());

        tracing::debug!(
            request_id = %ctx.id,
            route_id = %route.id,
            method = %ctx.method,
            path = %ctx.path,
            "Dispatching request"
        );

        let result = self.execute(&route, &ctx).await;
        let duration = ctx.received_at.elapsed();

        match result {
            Ok(mut resp) => {
                resp.duration = duration;
                record_request(
                    &self.metrics,
                    &route.id,
                    &ctx.method,
                    resp.status,
                    duration,
                    resp.size,
                );
                Ok(resp)
            }
            Err(err) => {
                record_request(
                    &self.metrics,
                    &route.id,
                    &ctx.method,
                    err.status_code(),
                    duration,
                    0,
                );
                tracing::debug!(request_id = %ctx.id, route_id = %route.id, error = %err, "Dispatch failed");
                Err(err)
            }
        }
    }

    /// Steps 2-9: gates, cache, handler, bookkeeping.
    async fn execute(&self, route: &Route, ctx: &RequestContext) -> GatewayResult<ResponseContext> {
        if let Some(auth) = &route.config.auth {
            access_control::enforce(&route.id, auth, ctx)?;
        }

        let mut limiter_key = None;
        if let Some(policy) = &route.config.rate_limit {
            let caller = ctx.principal.as_ref().map(|p| p.id.as_str());
            let key = window_key(&route.id, caller, policy);
            self.limiters.check(&route.id, &key, policy)?;
            limiter_key = Some(key);
        }

        if let Some(policy) = &route.config.breaker {
            self.breakers.check(&route.id, policy)?;
        }

        let cache_key = route
            .config
            .cache
            .as_ref()
            .map(|policy| cache::cache_key(route, policy, ctx));
        if let Some(key) = cache_key.as_deref() {
            if let Some(hit) = self.cache.lookup(key).await {
                tracing::debug!(request_id = %ctx.id, route_id = %route.id, "Cache hit");
                // A hit short-circuits dispatch; an admitted half-open
                // trial must not stay consumed by it.
                if route.config.breaker.is_some() {
                    self.breakers.release_trial(&route.id);
                }
                self.refund_if_skipped(route, limiter_key.as_deref(), hit.is_success());
                return Ok(hit);
            }
        }

        let outcome = self.invoke_handler(route, ctx).await;

        if let Some(policy) = route.config.cache.as_ref() {
            if let (Ok(resp), Some(key)) = (&outcome, cache_key.as_deref()) {
                self.cache.store(key, policy, resp).await;
            }
        }

        if let Some(policy) = &route.config.breaker {
            if Self::is_upstream_failure(route, &outcome) {
                self.breakers.record_failure(&route.id, policy);
            } else if outcome.is_ok() {
                self.breakers.record_success(&route.id);
            } else {
                // Handler failed before any upstream outcome
                // (transformation, configuration); the trial slot comes
                // back without closing or reopening the breaker.
                self.breakers.release_trial(&route.id);
            }
        }

        let succeeded = outcome.as_ref().map(ResponseContext::is_success).unwrap_or(false);
        self.refund_if_skipped(route, limiter_key.as_deref(), succeeded);

        outcome
    }

    fn refund_if_skipped(&self, route: &Route, limiter_key: Option<&str>, succeeded: bool) {
        let (Some(policy), Some(key)) = (&route.config.rate_limit, limiter_key) else {
            return;
        };
        if (succeeded && policy.skip_successful_requests)
            || (!succeeded && policy.skip_failed_requests)
        {
            self.limiters.refund(key);
        }
    }

    /// Did the handler outcome represent an upstream failure for breaker
    /// purposes? Passthrough 502/503/504 from a proxy target counts.
    fn is_upstream_failure(route: &Route, outcome: &GatewayResult<ResponseContext>) -> bool {
        match outcome {
            Err(GatewayError::UpstreamTimeout { .. }) | Err(GatewayError::UpstreamError { .. }) => {
                true
            }
            Ok(resp) => {
                route.kind == RouteType::Proxy && matches!(resp.status, 502 | 503 | 504)
            }
            Err(_) => false,
        }
    }

    /// Step 7: dispatch by route type.
    async fn invoke_handler(
        &self,
        route: &Route,
        ctx: &RequestContext,
    ) -> GatewayResult<ResponseContext> {
        match route.kind {
            RouteType::Proxy => self.handle_proxy(route, ctx).await,
            RouteType::Redirect => self.handle_redirect(route, ctx),
            RouteType::Function => self.handle_function(route, ctx).await,
            RouteType::Mock => Ok(Self::handle_mock(route)),
            RouteType::Webhook => self.handle_webhook(route, ctx),
        }
    }

    async fn handle_proxy(
        &self,
        route: &Route,
        ctx: &RequestContext,
    ) -> GatewayResult<ResponseContext> {
        let mut transformed = false;

        let mut body = ctx.body.clone();
        if let Some(transformer) = self.transforms.get(&route.id, Direction::Request) {
            if let Some(payload) = body.take() {
                body = Some(transformer.apply(payload).map_err(|message| {
                    GatewayError::Transformation {
                        route_id: route.id.clone(),
                        message,
                    }
                })?);
                transformed = true;
            }
        }

        let mut resp = proxy::dispatch(self.client.as_ref(), route, ctx, body).await?;

        if let Some(transformer) = self.transforms.get(&route.id, Direction::Response) {
            if let Some(payload) = resp.body.take() {
                let replaced = transformer.apply(payload).map_err(|message| {
                    GatewayError::Transformation {
                        route_id: route.id.clone(),
                        message,
                    }
                })?;
                resp = resp.with_body(replaced);
                transformed = true;
            }
        }

        resp.transformed = transformed;
        Ok(resp)
    }

    fn handle_redirect(&self, route: &Route, ctx: &RequestContext) -> GatewayResult<ResponseContext> {
        let location = proxy::build_target_url(route, ctx)?;
        Ok(ResponseContext::new(route.config.redirect_status).with_header("location", location))
    }

    async fn handle_function(
        &self,
        route: &Route,
        ctx: &RequestContext,
    ) -> GatewayResult<ResponseContext> {
        let function = self.functions.get(&route.target).ok_or_else(|| {
            GatewayError::InvalidRouteType {
                route_id: route.id.clone(),
                message: format!("no function registered as '{}'", route.target),
            }
        })?;
        function.call(ctx).await
    }

    fn handle_mock(route: &Route) -> ResponseContext {
        let mock = route.config.mock.clone().unwrap_or_default();
        let mut resp = ResponseContext::new(mock.status);
        for (name, value) in mock.headers {
            resp = resp.with_header(name, value);
        }
        if !mock.body.is_empty() {
            resp = resp.with_body(mock.body);
        }
        resp
    }

    /// Spawn asynchronous delivery and acknowledge immediately.
    fn handle_webhook(&self, route: &Route, ctx: &RequestContext) -> GatewayResult<ResponseContext> {
        let url = proxy::build_target_url(route, ctx)?;
        let request = UpstreamRequest {
            method: "POST".to_string(),
            url,
            headers: proxy::merge_headers(route, ctx),
            body: ctx.body.clone(),
            timeout: Duration::from_millis(route.config.timeout_ms),
        };

        let client = self.client.clone();
        let route_id = route.id.clone();
        tokio::spawn(async move {
            match client.send(request).await {
                Ok(resp) => {
                    tracing::debug!(route_id, status = resp.status, "Webhook delivered");
                }
                Err(failure) => {
                    tracing::warn!(route_id, failure = ?failure, "Webhook delivery failed");
                }
            }
        });

        Ok(ResponseContext::new(202).with_body("{\"accepted\":true}"))
    }
}
