//! Route registry and index.
//!
//! # Responsibilities
//! - Hold the in-memory route index: a by-id map plus pattern-grouped,
//!   priority-sorted candidate lists
//! - Replace the whole index atomically on `load_routes`, maintain it
//!   incrementally on add/update/remove
//! - Recompile transformer references whenever a route (re)registers,
//!   rejecting routes with unresolvable transforms
//! - Invalidate breaker/rate-limit/health state for removed routes
//!
//! # Design Decisions
//! - The index itself is immutable; mutations build a new snapshot and
//!   swap it in via `ArcSwap`, so `find_route` never takes a lock
//! - Ties between equal-priority matches resolve to the earliest
//!   registered route (a monotonic sequence number records order)
//! - No match is a valid `None`, not an error; the pipeline turns it
//!   into `RouteNotFound`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::GatewayResult;
use crate::health::state::HealthRegistry;
use crate::resilience::BreakerRegistry;
use crate::routing::matcher;
use crate::routing::route::{Route, RouteStatus};
use crate::security::RateLimiterRegistry;
use crate::transform::TransformRegistry;

#[derive(Clone)]
struct IndexedRoute {
    route: Arc<Route>,
    seq: u64,
}

#[derive(Default)]
struct RouteIndex {
    by_id: HashMap<String, IndexedRoute>,
    /// Pattern-group key → candidates sorted by (priority desc, seq asc).
    groups: HashMap<String, Vec<IndexedRoute>>,
}

impl RouteIndex {
    fn insert(&mut self, indexed: IndexedRoute) {
        let group_key = matcher::pattern_group(&indexed.route.path);
        let group = self.groups.entry(group_key).or_default();
        group.push(indexed.clone());
        group.sort_by(|a, b| {
            b.route
                .priority
                .cmp(&a.route.priority)
                .then(a.seq.cmp(&b.seq))
        });
        self.by_id.insert(indexed.route.id.clone(), indexed);
    }

    fn remove(&mut self, route_id: &str) -> Option<IndexedRoute> {
        let removed = self.by_id.remove(route_id)?;
        let group_key = matcher::pattern_group(&removed.route.path);
        if let Some(group) = self.groups.get_mut(&group_key) {
            group.retain(|r| r.route.id != route_id);
            if group.is_empty() {
                self.groups.remove(&group_key);
            }
        }
        Some(removed)
    }
}

/// Loads, indexes, and looks up routes; composes the matcher.
pub struct RouteRegistry {
    index: ArcSwap<RouteIndex>,
    next_seq: AtomicU64,
    transforms: Arc<TransformRegistry>,
    breakers: Arc<BreakerRegistry>,
    limiters: Arc<RateLimiterRegistry>,
    health: Arc<HealthRegistry>,
}

impl RouteRegistry {
    pub fn new(
        transforms: Arc<TransformRegistry>,
        breakers: Arc<BreakerRegistry>,
        limiters: Arc<RateLimiterRegistry>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        Self {
            index: ArcSwap::from_pointee(RouteIndex::default()),
            next_seq: AtomicU64::new(0),
            transforms,
            breakers,
            limiters,
            health,
        }
    }

    /// Replace the entire index from the external route source. The whole
    /// batch's transforms resolve first; a route that fails to resolve
    /// aborts the load, keeping the previous index and its compiled
    /// transforms in service.
    pub fn load_routes(&self, routes: Vec<Route>) -> GatewayResult<()> {
        self.transforms.compile_routes(&routes)?;
        let mut fresh = RouteIndex::default();
        for route in routes {
            fresh.insert(IndexedRoute {
                route: Arc::new(route),
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            });
        }
        let count = fresh.by_id.len();
        self.index.store(Arc::new(fresh));
        tracing::info!(routes = count, "Route index replaced");
        Ok(())
    }

    /// Register one route incrementally.
    pub fn add_route(&self, route: Route) -> GatewayResult<()> {
        self.transforms.compile_route(&route)?;
        let indexed = IndexedRoute {
            route: Arc::new(route),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.rcu(move |idx| {
            idx.remove(&indexed.route.id);
            idx.insert(indexed.clone());
        });
        Ok(())
    }

    /// Replace an indexed route. The replacement takes a fresh sequence
    /// number; state registries keyed by the id are preserved.
    pub fn update_route(&self, route: Route) -> GatewayResult<()> {
        self.add_route(route)
    }

    /// Remove a route and drop every piece of per-route state tied to it.
    pub fn remove_route(&self, route_id: &str) {
        self.rcu(|idx| {
            idx.remove(route_id);
        });
        self.transforms.invalidate(route_id);
        self.breakers.remove(route_id);
        self.limiters.remove_route(route_id);
        self.health.remove(route_id);
        tracing::debug!(route_id, "Route removed and per-route state invalidated");
    }

    fn rcu(&self, mutate: impl Fn(&mut RouteIndex)) {
        self.index.rcu(|current| {
            let mut next = RouteIndex {
                by_id: current.by_id.clone(),
                groups: current.groups.clone(),
            };
            mutate(&mut next);
            next
        });
    }

    pub fn get(&self, route_id: &str) -> Option<Arc<Route>> {
        self.index.load().by_id.get(route_id).map(|r| r.route.clone())
    }

    /// Every indexed route, in no particular order.
    pub fn all_routes(&self) -> Vec<Arc<Route>> {
        self.index
            .load()
            .by_id
            .values()
            .map(|r| r.route.clone())
            .collect()
    }

    /// Find the route serving (path, method, tenant): Active status,
    /// method membership, tenant scope, template match; best candidate by
    /// (priority desc, registration order asc) across all pattern groups.
    pub fn find_route(
        &self,
        path: &str,
        method: &str,
        tenant_id: Option<&str>,
    ) -> Option<Arc<Route>> {
        let index = self.index.load();
        let mut best: Option<&IndexedRoute> = None;

        for (group_key, candidates) in &index.groups {
            if !matcher::matches_pattern(path, group_key) {
                continue;
            }
            for candidate in candidates {
                let route = &candidate.route;
                if route.status != RouteStatus::Active
                    || !route.methods.contains(method)
                    || !route.accepts_tenant(tenant_id)
                    || !matcher::matches_path(path, &route.path)
                {
                    continue;
                }
                match best {
                    None => best = Some(candidate),
                    Some(current) => {
                        let better = route.priority > current.route.priority
                            || (route.priority == current.route.priority
                                && candidate.seq < current.seq);
                        if better {
                            best = Some(candidate);
                        }
                    }
                }
                // Candidates within a group are pre-sorted; the first hit
                // is the group's best.
                break;
            }
        }

        best.map(|r| r.route.clone())
    }
}
