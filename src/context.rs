//! Request/response context types.
//!
//! # Responsibilities
//! - Carry the normalized inbound request through the dispatch pipeline
//! - Carry the produced response (with cache/transform provenance) back out
//!
//! A `RequestContext` is created at arrival and discarded after the response
//! is produced; it is never persisted. Header names are normalized to
//! lowercase at construction so cache-key derivation stays deterministic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routing::route::Route;

/// Already-authenticated caller identity, resolved upstream of this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Per-call ephemeral request state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub principal: Option<Principal>,
    pub tenant_id: Option<String>,
    pub received_at: Instant,
    /// Filled in by the pipeline once a route is matched.
    pub route: Option<Arc<Route>>,
    /// `:param` bindings extracted from the matched route template.
    pub path_params: HashMap<String, String>,
    /// Free-form bag for adapter/handler annotations.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into().to_uppercase(),
            path: path.into(),
            headers: HashMap::new(),
            query: HashMap::new(),
            body: None,
            principal: None,
            tenant_id: None,
            received_at: Instant::now(),
            route: None,
            path_params: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.tenant_id = principal.tenant_id.clone();
        self.principal = Some(principal);
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Response produced once per request.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub cached: bool,
    pub transformed: bool,
    pub duration: Duration,
    pub size: usize,
}

impl ResponseContext {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
            cached: false,
            transformed: false,
            duration: Duration::ZERO,
            size: 0,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.size = body.len();
        self.body = Some(body);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}
