//! Inbound HTTP adapter.
//!
//! # Responsibilities
//! - Convert inbound axum requests into `RequestContext` values
//! - Hand them to the dispatch pipeline
//! - Render `ResponseContext`/`GatewayError` back to HTTP
//!
//! Principal resolution is external: whatever middleware authenticated
//! the caller is expected to insert a `Principal` into the request
//! extensions before this handler runs. Tenant scope falls back to the
//! `x-tenant-id` header for unauthenticated traffic.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::EngineConfig;
use crate::context::{Principal, RequestContext, ResponseContext};
use crate::dispatch::Dispatcher;
use crate::error::GatewayError;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server fronting the dispatch engine.
pub struct GatewayServer {
    router: Router,
    config: EngineConfig,
}

impl GatewayServer {
    pub fn new(config: EngineConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState { dispatcher };
        let router = Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.listener.request_timeout_secs),
            ))
            .layer(TraceLayer::new_for_http());
        Self { router, config }
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let ctx = match build_context(request).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    match state.dispatcher.dispatch(ctx).await {
        Ok(resp) => render_response(resp),
        Err(err) => render_error(err),
    }
}

async fn build_context(request: Request<Body>) -> Result<RequestContext, Response> {
    let (parts, body) = request.into_parts();

    let mut ctx = RequestContext::new(parts.method.as_str(), parts.uri.path());
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            ctx.headers
                .insert(name.as_str().to_lowercase(), value.to_string());
        }
    }
    if let Some(query) = parts.uri.query() {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            ctx.query.insert(k.into_owned(), v.into_owned());
        }
    }

    if let Some(principal) = parts.extensions.get::<Principal>() {
        ctx = ctx.with_principal(principal.clone());
    } else if let Some(tenant) = ctx.header("x-tenant-id").map(str::to_string) {
        ctx = ctx.with_tenant(tenant);
    }

    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| {
            (axum::http::StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
        })?;
    if !bytes.is_empty() {
        ctx = ctx.with_body(bytes);
    }

    Ok(ctx)
}

fn render_response(resp: ResponseContext) -> Response {
    let mut builder = axum::http::Response::builder().status(resp.status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &resp.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<axum::http::HeaderName>(),
                value.parse::<axum::http::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }
        if resp.cached {
            headers.insert("x-cache", axum::http::HeaderValue::from_static("HIT"));
        }
    }
    let body = match resp.body {
        Some(bytes) => Body::from(bytes),
        None => Body::empty(),
    };
    builder.body(body).unwrap_or_else(|_| {
        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "Invalid upstream response")
            .into_response()
    })
}

fn render_error(err: GatewayError) -> Response {
    let status = axum::http::StatusCode::from_u16(err.status_code())
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
