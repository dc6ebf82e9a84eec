//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every route with health checking enabled
//! - Update the health registry from probe results
//! - Emit one `HealthEvent` per failing probe cycle on the typed channel
//!
//! # Design Decisions
//! - Probe failures are logged, never propagated to the request path
//! - The ticker delays missed ticks so a slow probe cycle cannot overlap
//!   the next one
//! - Routes declare their own probe cadence; the monitor skips a route
//!   whose interval has not yet elapsed since its last probe

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};

use crate::health::state::{HealthEvent, HealthRegistry};
use crate::routing::route::Route;
use crate::routing::RouteRegistry;
use crate::upstream::{UpstreamClient, UpstreamRequest};

pub struct HealthMonitor {
    routes: Arc<RouteRegistry>,
    health: Arc<HealthRegistry>,
    client: Arc<dyn UpstreamClient>,
    events: mpsc::Sender<HealthEvent>,
    tick_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        routes: Arc<RouteRegistry>,
        health: Arc<HealthRegistry>,
        client: Arc<dyn UpstreamClient>,
        events: mpsc::Sender<HealthEvent>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            routes,
            health,
            client,
            events,
            tick_interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.tick_interval.as_secs(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check_all(&self) {
        for route in self.routes.all_routes() {
            let Some(policy) = route.config.health_check.as_ref() else {
                continue;
            };

            // Honor the route's own cadence.
            let state = self.health.get(&route.id);
            if let Some(last) = state.last_probe {
                if last.elapsed() < Duration::from_secs(policy.interval_secs) {
                    continue;
                }
            }

            self.probe(&route).await;
        }
    }

    async fn probe(&self, route: &Route) {
        // Policy presence was checked by the caller.
        let Some(policy) = route.config.health_check.as_ref() else {
            return;
        };

        let url = format!(
            "{}/{}",
            route.target.trim_end_matches('/'),
            policy.path.trim_start_matches('/')
        );
        let request = UpstreamRequest {
            method: "GET".to_string(),
            url: url.clone(),
            headers: [("user-agent".to_string(), "gateway-health-check".to_string())]
                .into_iter()
                .collect(),
            body: None,
            timeout: Duration::from_secs(policy.timeout_secs),
        };

        let (healthy, reason) = match self.client.send(request).await {
            Ok(resp) if (200..300).contains(&resp.status) => (true, String::new()),
            Ok(resp) => {
                tracing::warn!(route_id = %route.id, url = %url, status = resp.status, "Health check failed: non-success status");
                (false, format!("status {}", resp.status))
            }
            Err(failure) => {
                tracing::warn!(route_id = %route.id, url = %url, failure = ?failure, "Health check failed");
                (false, format!("{failure:?}"))
            }
        };

        let was_healthy = self.health.record_probe(&route.id, healthy);
        metrics::gauge!("gateway_route_health", "route" => route.id.clone())
            .set(if healthy { 1.0 } else { 0.0 });

        if healthy {
            if !was_healthy {
                tracing::info!(route_id = %route.id, "Route recovered");
            }
            return;
        }

        // One notification per failing cycle, fire-and-forget.
        let event = HealthEvent {
            route_id: route.id.clone(),
            target: route.target.clone(),
            reason,
        };
        if self.events.try_send(event).is_err() {
            tracing::debug!(route_id = %route.id, "Health event channel full, notification dropped");
        }
    }
}
