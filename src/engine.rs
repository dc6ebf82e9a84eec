//! Engine assembly.
//!
//! Wires the shared registries, cache adapter, and dispatcher together so
//! the binary and tests build the same graph.

use std::sync::Arc;

use crate::cache::{CacheStore, ResponseCache};
use crate::dispatch::Dispatcher;
use crate::health::HealthRegistry;
use crate::observability::MetricsAggregate;
use crate::resilience::BreakerRegistry;
use crate::routing::RouteRegistry;
use crate::security::RateLimiterRegistry;
use crate::transform::{FunctionRegistry, TransformRegistry};
use crate::upstream::UpstreamClient;

/// The assembled dispatch engine and its shared registries.
pub struct Engine {
    pub routes: Arc<RouteRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub limiters: Arc<RateLimiterRegistry>,
    pub health: Arc<HealthRegistry>,
    pub transforms: Arc<TransformRegistry>,
    pub functions: Arc<FunctionRegistry>,
    pub metrics: Arc<MetricsAggregate>,
    pub client: Arc<dyn UpstreamClient>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Engine {
    /// Assemble an engine around the given upstream client and cache
    /// store. Transformers and functions register on the returned
    /// registries before routes load.
    pub fn new(client: Arc<dyn UpstreamClient>, store: Arc<dyn CacheStore>) -> Self {
        let breakers = Arc::new(BreakerRegistry::new());
        let limiters = Arc::new(RateLimiterRegistry::new());
        let health = Arc::new(HealthRegistry::new());
        let transforms = Arc::new(TransformRegistry::new());
        let functions = Arc::new(FunctionRegistry::new());
        let metrics = Arc::new(MetricsAggregate::new());

        let routes = Arc::new(RouteRegistry::new(
            transforms.clone(),
            breakers.clone(),
            limiters.clone(),
            health.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            routes.clone(),
            breakers.clone(),
            limiters.clone(),
            transforms.clone(),
            functions.clone(),
            ResponseCache::new(store),
            client.clone(),
            metrics.clone(),
        ));

        Self {
            routes,
            breakers,
            limiters,
            health,
            transforms,
            functions,
            metrics,
            client,
            dispatcher,
        }
    }
}
