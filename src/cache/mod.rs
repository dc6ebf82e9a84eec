//! Response caching.
//!
//! # Responsibilities
//! - Derive the deterministic cache key (fingerprint) for a request
//! - Look up / store responses against the external cache store
//!
//! # Design Decisions
//! - Query pairs are sorted and vary-by headers taken in declared order,
//!   so the same request always fingerprints identically
//! - Only successful (<400) responses are ever written
//! - Pattern invalidation is delegated to the store; out-of-band mutation
//!   events trigger it, not this adapter

pub mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;

use crate::context::{RequestContext, ResponseContext};
use crate::routing::route::{CachePolicy, Route};

pub use store::{CacheStore, CachedResponse, MemoryCacheStore};

/// Deterministic serialization of (route id, method, path, sorted query,
/// vary-by headers). Missing vary-by headers serialize as empty so their
/// absence is itself part of the key.
pub fn cache_key(route: &Route, policy: &CachePolicy, ctx: &RequestContext) -> String {
    let mut query: Vec<(&String, &String)> = ctx.query.iter().collect();
    query.sort();
    let query: Vec<String> = query.into_iter().map(|(k, v)| format!("{k}={v}")).collect();

    let vary: Vec<String> = policy
        .vary_by
        .iter()
        .map(|name| format!("{name}={}", ctx.header(name).unwrap_or_default()))
        .collect();

    format!(
        "{}:{}:{}?{}|{}",
        route.id,
        ctx.method,
        ctx.path,
        query.join("&"),
        vary.join(",")
    )
}

/// Cache adapter consulted by the dispatch pipeline.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Look up a cached response; a hit comes back with `cached = true`.
    pub async fn lookup(&self, key: &str) -> Option<ResponseContext> {
        let hit = self.store.get(key).await?;
        metrics::counter!("gateway_cache_hits_total").increment(1);
        let mut resp = ResponseContext::new(hit.status);
        resp.headers = hit.headers;
        if let Some(body) = hit.body {
            resp = resp.with_body(Bytes::from(body));
        }
        resp.cached = true;
        Some(resp)
    }

    /// Store a successful response under the route's TTL. Failures are
    /// never cached.
    pub async fn store(&self, key: &str, policy: &CachePolicy, resp: &ResponseContext) {
        if !resp.is_success() {
            return;
        }
        let value = CachedResponse {
            status: resp.status,
            headers: resp.headers.clone(),
            body: resp.body.as_ref().map(|b| b.to_vec()),
        };
        self.store
            .set(key, value, Duration::from_secs(policy.ttl_secs))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::route::RouteType;

    fn route() -> Route {
        Route::new("r1", RouteType::Proxy, "/api/*", "http://svc")
    }

    #[test]
    fn test_key_is_deterministic_under_query_order() {
        let policy = CachePolicy::default();
        let a = RequestContext::new("GET", "/api/items")
            .with_query("b", "2")
            .with_query("a", "1");
        let b = RequestContext::new("GET", "/api/items")
            .with_query("a", "1")
            .with_query("b", "2");
        assert_eq!(cache_key(&route(), &policy, &a), cache_key(&route(), &policy, &b));
    }

    #[test]
    fn test_vary_by_header_changes_key() {
        let policy = CachePolicy {
            vary_by: vec!["authorization".into()],
            ..CachePolicy::default()
        };
        let a = RequestContext::new("GET", "/api/items").with_header("Authorization", "alice");
        let b = RequestContext::new("GET", "/api/items").with_header("Authorization", "bob");
        let c = RequestContext::new("GET", "/api/items");

        let ka = cache_key(&route(), &policy, &a);
        assert_ne!(ka, cache_key(&route(), &policy, &b));
        assert_ne!(ka, cache_key(&route(), &policy, &c));
        assert_eq!(
            ka,
            cache_key(
                &route(),
                &policy,
                &RequestContext::new("GET", "/api/items").with_header("authorization", "alice")
            )
        );
    }

    #[tokio::test]
    async fn test_failures_are_not_stored() {
        let cache = ResponseCache::new(Arc::new(MemoryCacheStore::new()));
        let policy = CachePolicy::default();

        cache.store("k", &policy, &ResponseContext::new(502)).await;
        assert!(cache.lookup("k").await.is_none());

        cache
            .store("k", &policy, &ResponseContext::new(200).with_body("ok"))
            .await;
        let hit = cache.lookup("k").await.unwrap();
        assert!(hit.cached);
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body.as_deref(), Some(&b"ok"[..]));
    }
}
