//! End-to-end dispatch pipeline tests against a programmable upstream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;

use gateway_engine::cache::MemoryCacheStore;
use gateway_engine::context::{Principal, RequestContext, ResponseContext};
use gateway_engine::error::GatewayError;
use gateway_engine::routing::route::{
    AuthPolicy, BreakerPolicy, CachePolicy, MockPolicy, RateLimitPolicy, Route, RouteType,
};
use gateway_engine::transform::RouteFunction;
use gateway_engine::upstream::{
    UpstreamClient, UpstreamFailure, UpstreamRequest, UpstreamResponse,
};
use gateway_engine::{Engine, GatewayResult};

/// Upstream fake: answers 200 "ok" unless a scripted outcome is queued.
struct ScriptedUpstream {
    calls: AtomicU32,
    script: Mutex<VecDeque<Result<UpstreamResponse, UpstreamFailure>>>,
    last_request: Mutex<Option<UpstreamRequest>>,
}

impl ScriptedUpstream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            last_request: Mutex::new(None),
        })
    }

    fn push(&self, outcome: Result<UpstreamResponse, UpstreamFailure>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    fn push_status(&self, status: u16, body: &str) {
        self.push(Ok(UpstreamResponse {
            status,
            headers: Default::default(),
            body: Bytes::from(body.to_string()),
        }));
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_url(&self) -> Option<String> {
        self.last_request.lock().unwrap().as_ref().map(|r| r.url.clone())
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(UpstreamResponse {
                status: 200,
                headers: Default::default(),
                body: Bytes::from_static(b"ok"),
            })
        })
    }
}

fn engine_with(upstream: Arc<ScriptedUpstream>) -> Engine {
    Engine::new(upstream, Arc::new(MemoryCacheStore::new()))
}

fn proxy_route(id: &str, path: &str, target: &str) -> Route {
    Route::new(id, RouteType::Proxy, path, target)
}

#[tokio::test]
async fn test_proxy_builds_wildcard_target_url() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());
    engine
        .routes
        .load_routes(vec![proxy_route("media", "/api/media/*", "http://media-svc")])
        .unwrap();

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/api/media/images/logo.png"))
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(
        upstream.last_url().as_deref(),
        Some("http://media-svc/images/logo.png")
    );
}

#[tokio::test]
async fn test_unmatched_path_is_route_not_found() {
    let engine = engine_with(ScriptedUpstream::new());
    engine.routes.load_routes(Vec::new()).unwrap();

    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RouteNotFound { .. }));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_breaker_opens_and_recovers_via_trial() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());

    let mut route = proxy_route("flaky", "/flaky/*", "http://flaky-svc");
    route.config.breaker = Some(BreakerPolicy {
        threshold: 3,
        reset_timeout_ms: 50,
    });
    engine.routes.load_routes(vec![route]).unwrap();

    for _ in 0..3 {
        upstream.push(Err(UpstreamFailure::Connection("refused".into())));
        let err = engine
            .dispatcher
            .dispatch(RequestContext::new("GET", "/flaky/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamError { .. }));
    }
    assert_eq!(upstream.calls(), 3);

    // Breaker is open: rejected without an upstream attempt.
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/flaky/x"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    assert_eq!(upstream.calls(), 3);

    // After the reset timeout one trial goes through and closes it.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/flaky/x"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(upstream.calls(), 4);

    // Closed again: normal traffic flows.
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/flaky/x"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_failed_trial_reopens_breaker() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());

    let mut route = proxy_route("flaky", "/flaky/*", "http://flaky-svc");
    route.config.breaker = Some(BreakerPolicy {
        threshold: 1,
        reset_timeout_ms: 40,
    });
    engine.routes.load_routes(vec![route]).unwrap();

    upstream.push(Err(UpstreamFailure::Connection("refused".into())));
    assert!(engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/flaky/x"))
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    upstream.push(Err(UpstreamFailure::Connection("refused".into())));
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/flaky/x"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamError { .. }));

    // Trial failed: open again immediately.
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/flaky/x"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { .. }));
}

#[tokio::test]
async fn test_cache_hit_during_trial_releases_breaker_slot() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());

    let mut route = proxy_route("data", "/data/*", "http://data-svc");
    route.config.cache = Some(CachePolicy::default());
    route.config.breaker = Some(BreakerPolicy {
        threshold: 1,
        reset_timeout_ms: 40,
    });
    engine.routes.load_routes(vec![route]).unwrap();

    // Prime the cache on one path, open the breaker on another.
    assert!(engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/data/a"))
        .await
        .is_ok());
    upstream.push(Err(UpstreamFailure::Connection("refused".into())));
    assert!(engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/data/b"))
        .await
        .is_err());
    assert_eq!(upstream.calls(), 2);

    // The cache hit consumes the half-open trial without reaching the
    // upstream; the slot must come back.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let hit = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/data/a"))
        .await
        .unwrap();
    assert!(hit.cached);
    assert_eq!(upstream.calls(), 2);

    // A fresh trial is admitted right away and closes the breaker.
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/data/b"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(upstream.calls(), 3);
}

#[tokio::test]
async fn test_transform_error_during_trial_releases_breaker_slot() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());
    engine.transforms.register(
        "reject",
        Arc::new(|_: Bytes| -> Result<Bytes, String> { Err("rejected".into()) }),
    );

    let mut route = proxy_route("guarded", "/guarded/*", "http://guarded-svc");
    route.config.breaker = Some(BreakerPolicy {
        threshold: 1,
        reset_timeout_ms: 40,
    });
    route.config.transforms.request = Some("reject".into());
    engine.routes.load_routes(vec![route]).unwrap();

    // Bodyless request skips the transform and opens the breaker.
    upstream.push(Err(UpstreamFailure::Connection("refused".into())));
    assert!(engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/guarded/x"))
        .await
        .is_err());
    assert_eq!(upstream.calls(), 1);

    // The trial fails in the transformer before any upstream call.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("POST", "/guarded/x").with_body("payload"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transformation { .. }));
    assert_eq!(upstream.calls(), 1);

    // The slot came back: the next call is admitted and closes the
    // breaker on success.
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/guarded/x"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_rate_limit_window() {
    let engine = engine_with(ScriptedUpstream::new());

    let mut route = Route::new("limited", RouteType::Mock, "/limited", "");
    route.config.rate_limit = Some(RateLimitPolicy {
        limit: 2,
        window_ms: 80,
        ..RateLimitPolicy::default()
    });
    engine.routes.load_routes(vec![route]).unwrap();

    for _ in 0..2 {
        assert!(engine
            .dispatcher
            .dispatch(RequestContext::new("GET", "/limited"))
            .await
            .is_ok());
    }
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/limited"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    assert_eq!(err.status_code(), 429);

    // Fresh window after the reset.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/limited"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cache_hit_skips_dispatch_and_honors_vary_by() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());

    let mut route = proxy_route("cached", "/data/*", "http://data-svc");
    route.config.cache = Some(CachePolicy {
        ttl_secs: 300,
        vary_by: vec!["authorization".into()],
    });
    engine.routes.load_routes(vec![route]).unwrap();

    let request =
        || RequestContext::new("GET", "/data/items").with_header("Authorization", "alice");

    let first = engine.dispatcher.dispatch(request()).await.unwrap();
    assert!(!first.cached);
    assert_eq!(upstream.calls(), 1);

    let second = engine.dispatcher.dispatch(request()).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.body.as_deref(), Some(&b"ok"[..]));
    assert_eq!(upstream.calls(), 1);

    // Different vary-by header value misses.
    let other = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/data/items").with_header("Authorization", "bob"))
        .await
        .unwrap();
    assert!(!other.cached);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_failed_responses_are_not_cached() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());

    let mut route = proxy_route("cached", "/data/*", "http://data-svc");
    route.config.cache = Some(CachePolicy::default());
    engine.routes.load_routes(vec![route]).unwrap();

    upstream.push_status(500, "boom");
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/data/items"))
        .await
        .unwrap();
    assert_eq!(resp.status, 500);

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/data/items"))
        .await
        .unwrap();
    assert!(!resp.cached);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_failed_reload_keeps_live_transforms() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());
    engine.transforms.register(
        "upper",
        Arc::new(|payload: Bytes| -> Result<Bytes, String> {
            Ok(Bytes::from(
                String::from_utf8_lossy(&payload).to_uppercase().into_bytes(),
            ))
        }),
    );

    let mut route = proxy_route("echo", "/echo/*", "http://echo-svc");
    route.config.transforms.response = Some("upper".into());
    engine.routes.load_routes(vec![route.clone()]).unwrap();

    upstream.push_status(200, "hello");
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/echo/a"))
        .await
        .unwrap();
    assert!(resp.transformed);
    assert_eq!(resp.body.as_deref(), Some(&b"HELLO"[..]));

    // A rejected reload must not strip the transform the live index
    // still declares.
    let mut bad = route.clone();
    bad.config.transforms.response = Some("missing".into());
    assert!(engine.routes.load_routes(vec![bad]).is_err());

    upstream.push_status(200, "hello");
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/echo/a"))
        .await
        .unwrap();
    assert!(resp.transformed);
    assert_eq!(resp.body.as_deref(), Some(&b"HELLO"[..]));
}

#[tokio::test]
async fn test_auth_gates() {
    let engine = engine_with(ScriptedUpstream::new());

    let mut route = Route::new("secure", RouteType::Mock, "/secure", "");
    route.config.auth = Some(AuthPolicy {
        required: true,
        roles: vec!["admin".into()],
        scopes: vec![],
    });
    engine.routes.load_routes(vec![route]).unwrap();

    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/secure"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);

    let viewer = Principal {
        id: "u1".into(),
        roles: vec!["viewer".into()],
        scopes: vec![],
        tenant_id: None,
    };
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/secure").with_principal(viewer))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let admin = Principal {
        id: "u2".into(),
        roles: vec!["admin".into()],
        scopes: vec![],
        tenant_id: None,
    };
    assert!(engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/secure").with_principal(admin))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_retries_for_idempotent_methods_only() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());

    let mut route = proxy_route("retry", "/retry/*", "http://retry-svc");
    route.config.retries = 2;
    engine.routes.load_routes(vec![route]).unwrap();

    // GET: two failures then success, within the retry budget.
    upstream.push(Err(UpstreamFailure::Connection("refused".into())));
    upstream.push_status(503, "unavailable");
    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/retry/x"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(upstream.calls(), 3);

    // POST: single attempt regardless of configured retries.
    upstream.push(Err(UpstreamFailure::Connection("refused".into())));
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("POST", "/retry/x"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamError { .. }));
    assert_eq!(upstream.calls(), 4);
}

#[tokio::test]
async fn test_upstream_timeout_surfaces_504() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());
    engine
        .routes
        .load_routes(vec![proxy_route("slow", "/slow/*", "http://slow-svc")])
        .unwrap();

    upstream.push(Err(UpstreamFailure::Timeout));
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("POST", "/slow/x"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamTimeout { .. }));
    assert_eq!(err.status_code(), 504);
}

#[tokio::test]
async fn test_redirect_route() {
    let engine = engine_with(ScriptedUpstream::new());
    let mut route = Route::new("moved", RouteType::Redirect, "/old/*", "http://new-host");
    route.config.redirect_status = 301;
    engine.routes.load_routes(vec![route]).unwrap();

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/old/docs/intro"))
        .await
        .unwrap();
    assert_eq!(resp.status, 301);
    assert_eq!(
        resp.headers.get("location").map(String::as_str),
        Some("http://new-host/docs/intro")
    );
}

#[tokio::test]
async fn test_mock_route() {
    let engine = engine_with(ScriptedUpstream::new());
    let mut route = Route::new("mock", RouteType::Mock, "/fake", "");
    route.config.mock = Some(MockPolicy {
        status: 418,
        headers: [("content-type".to_string(), "text/plain".to_string())]
            .into_iter()
            .collect(),
        body: "teapot".into(),
    });
    engine.routes.load_routes(vec![route]).unwrap();

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/fake"))
        .await
        .unwrap();
    assert_eq!(resp.status, 418);
    assert_eq!(resp.body.as_deref(), Some(&b"teapot"[..]));
    assert_eq!(
        resp.headers.get("content-type").map(String::as_str),
        Some("text/plain")
    );
}

struct EchoFunction;

#[async_trait]
impl RouteFunction for EchoFunction {
    async fn call(&self, ctx: &RequestContext) -> GatewayResult<ResponseContext> {
        Ok(ResponseContext::new(200).with_body(format!("echo:{}", ctx.path)))
    }
}

#[tokio::test]
async fn test_function_route() {
    let engine = engine_with(ScriptedUpstream::new());
    engine.functions.register("echo", Arc::new(EchoFunction));
    engine
        .routes
        .load_routes(vec![Route::new("fn", RouteType::Function, "/fn/:name", "echo")])
        .unwrap();

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/fn/test"))
        .await
        .unwrap();
    assert_eq!(resp.body.as_deref(), Some(&b"echo:/fn/test"[..]));

    // Unregistered handler is a configuration defect.
    engine
        .routes
        .load_routes(vec![Route::new("fn", RouteType::Function, "/fn/:name", "missing")])
        .unwrap();
    let err = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/fn/test"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRouteType { .. }));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_webhook_acknowledges_before_delivery() {
    let upstream = ScriptedUpstream::new();
    let engine = engine_with(upstream.clone());
    engine
        .routes
        .load_routes(vec![Route::new(
            "hook",
            RouteType::Webhook,
            "/events/*",
            "http://hook-sink",
        )])
        .unwrap();

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("POST", "/events/order-created").with_body("{\"id\":1}"))
        .await
        .unwrap();
    assert_eq!(resp.status, 202);

    // Delivery happens asynchronously.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(upstream.calls(), 1);
    assert_eq!(
        upstream.last_url().as_deref(),
        Some("http://hook-sink/order-created")
    );
}

#[tokio::test]
async fn test_tenant_scoped_routes() {
    let engine = engine_with(ScriptedUpstream::new());

    let mut acme = Route::new("acme", RouteType::Mock, "/api/data", "");
    acme.tenant_id = Some("acme".into());
    acme.priority = 10;
    acme.config.mock = Some(MockPolicy {
        body: "acme".into(),
        ..MockPolicy::default()
    });
    let mut global = Route::new("global", RouteType::Mock, "/api/data", "");
    global.config.mock = Some(MockPolicy {
        body: "global".into(),
        ..MockPolicy::default()
    });
    engine.routes.load_routes(vec![acme, global]).unwrap();

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/api/data").with_tenant("acme"))
        .await
        .unwrap();
    assert_eq!(resp.body.as_deref(), Some(&b"acme"[..]));

    let resp = engine
        .dispatcher
        .dispatch(RequestContext::new("GET", "/api/data").with_tenant("other"))
        .await
        .unwrap();
    assert_eq!(resp.body.as_deref(), Some(&b"global"[..]));
}

#[tokio::test]
async fn test_skip_successful_requests_refunds_quota() {
    let engine = engine_with(ScriptedUpstream::new());

    let mut route = Route::new("limited", RouteType::Mock, "/limited", "");
    route.config.rate_limit = Some(RateLimitPolicy {
        limit: 1,
        window_ms: 60_000,
        skip_successful_requests: true,
        ..RateLimitPolicy::default()
    });
    engine.routes.load_routes(vec![route]).unwrap();

    // Successful responses keep refunding the single slot.
    for _ in 0..3 {
        assert!(engine
            .dispatcher
            .dispatch(RequestContext::new("GET", "/limited"))
            .await
            .is_ok());
    }
}
