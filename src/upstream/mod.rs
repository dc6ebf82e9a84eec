//! Upstream HTTP client seam.
//!
//! # Responsibilities
//! - Define the contract the Proxy/Webhook handlers and the health prober
//!   dispatch through
//! - Provide the default hyper-based implementation with per-call timeout
//!
//! The trait keeps the concrete client external to the engine: tests plug
//! in programmable fakes, deployments keep the pooled hyper client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Outbound request description.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

/// Response from an upstream target.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// Connection-class failures. Status-bearing responses are never errors
/// at this layer; the pipeline decides what to do with them.
#[derive(Debug, Clone)]
pub enum UpstreamFailure {
    Timeout,
    Connection(String),
}

/// External HTTP client used by Proxy dispatch, Webhook delivery, and the
/// health prober.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure>;
}

/// Default client backed by hyper-util's pooled legacy client.
pub struct HyperUpstreamClient {
    client: Client<HttpConnector, Body>,
}

impl HyperUpstreamClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamClient for HyperUpstreamClient {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure> {
        let mut builder = Request::builder()
            .method(request.method.as_str())
            .uri(&request.url);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in &request.headers {
                let name = name
                    .parse::<axum::http::HeaderName>()
                    .map_err(|e| UpstreamFailure::Connection(e.to_string()))?;
                let value = value
                    .parse::<axum::http::HeaderValue>()
                    .map_err(|e| UpstreamFailure::Connection(e.to_string()))?;
                headers.insert(name, value);
            }
        }
        let body = match request.body {
            Some(bytes) => Body::from(bytes),
            None => Body::empty(),
        };
        let req = builder
            .body(body)
            .map_err(|e| UpstreamFailure::Connection(e.to_string()))?;

        let response = tokio::time::timeout(request.timeout, self.client.request(req))
            .await
            .map_err(|_| UpstreamFailure::Timeout)?
            .map_err(|e| UpstreamFailure::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = tokio::time::timeout(
            request.timeout,
            axum::body::to_bytes(Body::new(response.into_body()), usize::MAX),
        )
        .await
        .map_err(|_| UpstreamFailure::Timeout)?
        .map_err(|e| UpstreamFailure::Connection(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
