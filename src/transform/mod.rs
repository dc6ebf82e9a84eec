//! Payload transformation and in-process handlers.
//!
//! # Responsibilities
//! - Resolve a route's declared transformer references against the set of
//!   statically registered plugins
//! - Memoize the resolution per (route id, direction); a route update
//!   re-resolves
//! - Host the registry of in-process handlers for Function routes
//!
//! # Design Decisions
//! - Transformers are registered plugins, not dynamically compiled
//!   scripts: arbitrary tenant code in a shared process is an isolation
//!   hazard, and a registry keeps the "compile" step a cheap lookup
//! - Resolution failure surfaces at route registration; a route naming an
//!   unknown transformer is rejected, never silently passed through
//! - A transformer is a pure `Bytes -> Bytes` function; it must not hold
//!   mutable state across calls

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use dashmap::DashMap;

use crate::context::{RequestContext, ResponseContext};
use crate::error::{GatewayError, GatewayResult};
use crate::routing::route::Route;

/// Which payload a transformer applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

/// A pure payload transformation.
pub trait Transformer: Send + Sync {
    fn apply(&self, payload: Bytes) -> Result<Bytes, String>;
}

impl<F> Transformer for F
where
    F: Fn(Bytes) -> Result<Bytes, String> + Send + Sync,
{
    fn apply(&self, payload: Bytes) -> Result<Bytes, String> {
        self(payload)
    }
}

/// In-process handler bound to a Function route.
#[async_trait]
pub trait RouteFunction: Send + Sync {
    async fn call(&self, ctx: &RequestContext) -> GatewayResult<ResponseContext>;
}

/// Registered transformer plugins plus the per-route resolution memo.
#[derive(Default)]
pub struct TransformRegistry {
    plugins: DashMap<String, Arc<dyn Transformer>>,
    compiled: DashMap<(String, Direction), Arc<dyn Transformer>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named transformer plugin. Registration happens at
    /// process startup, before any routes load.
    pub fn register(&self, name: impl Into<String>, transformer: Arc<dyn Transformer>) {
        self.plugins.insert(name.into(), transformer);
    }

    /// Resolve and memoize both of a route's transformer references.
    /// Called by the route registry at add/update time. Both references
    /// resolve before the memo is touched, so a route naming an unknown
    /// transformer keeps whatever it had compiled before.
    pub fn compile_route(&self, route: &Route) -> GatewayResult<()> {
        let request = route
            .config
            .transforms
            .request
            .as_deref()
            .map(|name| self.resolve(&route.id, name))
            .transpose()?;
        let response = route
            .config
            .transforms
            .response
            .as_deref()
            .map(|name| self.resolve(&route.id, name))
            .transpose()?;

        self.invalidate(&route.id);
        if let Some(transformer) = request {
            self.compiled
                .insert((route.id.clone(), Direction::Request), transformer);
        }
        if let Some(transformer) = response {
            self.compiled
                .insert((route.id.clone(), Direction::Response), transformer);
        }
        Ok(())
    }

    /// Resolve a whole batch, then replace the memo wholesale. Nothing is
    /// committed when any route in the batch fails to resolve, so an index
    /// that keeps serving after a rejected reload keeps its transforms.
    pub fn compile_routes(&self, routes: &[Route]) -> GatewayResult<()> {
        let mut staged = Vec::new();
        for route in routes {
            if let Some(name) = route.config.transforms.request.as_deref() {
                staged.push((
                    (route.id.clone(), Direction::Request),
                    self.resolve(&route.id, name)?,
                ));
            }
            if let Some(name) = route.config.transforms.response.as_deref() {
                staged.push((
                    (route.id.clone(), Direction::Response),
                    self.resolve(&route.id, name)?,
                ));
            }
        }

        self.compiled.clear();
        for (key, transformer) in staged {
            self.compiled.insert(key, transformer);
        }
        Ok(())
    }

    fn resolve(&self, route_id: &str, name: &str) -> GatewayResult<Arc<dyn Transformer>> {
        let plugin = self.plugins.get(name).ok_or_else(|| GatewayError::Transformation {
            route_id: route_id.to_string(),
            message: format!("unknown transformer '{name}'"),
        })?;
        Ok(Arc::clone(plugin.value()))
    }

    /// The memoized transformer for a route/direction, if one is declared.
    pub fn get(&self, route_id: &str, direction: Direction) -> Option<Arc<dyn Transformer>> {
        self.compiled
            .get(&(route_id.to_string(), direction))
            .map(|t| Arc::clone(t.value()))
    }

    /// Drop the memoized transformers for a removed/updated route.
    pub fn invalidate(&self, route_id: &str) {
        self.compiled.remove(&(route_id.to_string(), Direction::Request));
        self.compiled.remove(&(route_id.to_string(), Direction::Response));
    }
}

/// Named in-process handlers for Function routes.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<dyn RouteFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, function: Arc<dyn RouteFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RouteFunction>> {
        self.functions.get(name).map(|f| Arc::clone(f.value()))
    }
}
