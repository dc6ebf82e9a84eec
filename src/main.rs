//! Gateway engine demo binary.
//!
//! Wires the engine with the default hyper upstream client and in-memory
//! cache store, spawns the health monitor and metrics collector, and
//! serves inbound traffic. Route definitions come from the external
//! route source; here an empty index is loaded and the administration
//! surface is expected to push routes in.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway_engine::cache::MemoryCacheStore;
use gateway_engine::health::HealthMonitor;
use gateway_engine::observability::{metrics, LogTelemetrySink, MetricsCollector};
use gateway_engine::upstream::HyperUpstreamClient;
use gateway_engine::{Engine, EngineConfig, GatewayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gateway-engine v0.1.0 starting");

    let config = EngineConfig::default();

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine = Engine::new(
        Arc::new(HyperUpstreamClient::new()),
        Arc::new(MemoryCacheStore::new()),
    );
    engine.routes.load_routes(Vec::new())?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let (health_tx, health_rx) = mpsc::channel(64);

    if config.health_monitor.enabled {
        let monitor = HealthMonitor::new(
            engine.routes.clone(),
            engine.health.clone(),
            engine.client.clone(),
            health_tx,
            Duration::from_secs(config.health_monitor.interval_secs),
        );
        tokio::spawn(monitor.run(shutdown_tx.subscribe()));
    }

    let collector = MetricsCollector::new(
        engine.metrics.clone(),
        Arc::new(LogTelemetrySink),
        Duration::from_secs(config.observability.flush_interval_secs),
    );
    tokio::spawn(collector.run(health_rx, shutdown_tx.subscribe()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GatewayServer::new(config, engine.dispatcher.clone());
    server.run(listener).await?;

    let _ = shutdown_tx.send(());
    tracing::info!("Shutdown complete");
    Ok(())
}
