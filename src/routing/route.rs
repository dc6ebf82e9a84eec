//! Route definitions.
//!
//! This module defines the route record shape supplied verbatim by the
//! external route source. All types derive Serde traits; the engine treats
//! loaded routes as immutable snapshots — an update replaces the indexed
//! entry, it never mutates fields in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a matched request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    /// Forward to the upstream target.
    Proxy,
    /// Synthesize a redirect to the target, no outbound call.
    Redirect,
    /// Invoke a registered in-process handler.
    Function,
    /// Return a statically configured response.
    Mock,
    /// Fire-and-forget delivery to the target, acknowledge immediately.
    Webhook,
}

/// Administrative lifecycle state. Only `Active` routes match traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Active,
    Inactive,
    Maintenance,
    Deprecated,
}

/// HTTP verbs a route accepts: an explicit set, or every verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodSet {
    /// The literal string "ALL".
    All(AllMethods),
    /// Explicit verb list, matched case-insensitively.
    List(Vec<String>),
}

/// Marker for the "ALL" wildcard (kept as its own type so the untagged
/// serde representation round-trips the literal string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllMethods {
    #[serde(rename = "ALL")]
    All,
}

impl MethodSet {
    pub fn all() -> Self {
        MethodSet::All(AllMethods::All)
    }

    pub fn of(methods: &[&str]) -> Self {
        MethodSet::List(methods.iter().map(|m| m.to_uppercase()).collect())
    }

    pub fn contains(&self, method: &str) -> bool {
        match self {
            MethodSet::All(_) => true,
            MethodSet::List(list) => list.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }
}

impl Default for MethodSet {
    fn default() -> Self {
        MethodSet::all()
    }
}

/// Circuit breaker thresholds for a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerPolicy {
    /// Consecutive failures before the breaker opens.
    pub threshold: u32,

    /// Time the breaker stays open before admitting a trial call, in ms.
    pub reset_timeout_ms: u64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Response caching policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Time-to-live for stored responses, in seconds.
    pub ttl_secs: u64,

    /// Header names (lowercase) whose values participate in the cache key.
    pub vary_by: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            vary_by: Vec::new(),
        }
    }
}

/// Fixed-window rate limit policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Maximum admitted requests per window.
    pub limit: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Key windows by caller identity in addition to route id.
    pub per_caller: bool,

    /// Refund the window slot once the response succeeded (<400).
    pub skip_successful_requests: bool,

    /// Refund the window slot once the response failed (>=400 or error).
    pub skip_failed_requests: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 100,
            window_ms: 60_000,
            per_caller: false,
            skip_successful_requests: false,
            skip_failed_requests: false,
        }
    }
}

/// Authentication requirement for a route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPolicy {
    /// Reject requests without a resolved principal.
    pub required: bool,

    /// Roles of which the principal must hold at least one.
    pub roles: Vec<String>,

    /// Scopes of which the principal must hold at least one.
    pub scopes: Vec<String>,
}

/// Named transformer references, resolved at route registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformRefs {
    pub request: Option<String>,
    pub response: Option<String>,
}

/// Active health-check policy for a route's target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckPolicy {
    /// Path probed on the target.
    pub path: String,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_secs: 10,
            timeout_secs: 5,
        }
    }
}

/// Static response for Mock routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockPolicy {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Default for MockPolicy {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: String::new(),
        }
    }
}

/// Per-route configuration bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    /// Static headers injected into the upstream request.
    pub headers: HashMap<String, String>,

    /// Static query parameters merged into the upstream URL (route wins).
    pub query: HashMap<String, String>,

    /// Upstream call timeout in milliseconds.
    pub timeout_ms: u64,

    /// Retry attempts after the first upstream failure (0 = no retry).
    pub retries: u32,

    /// Circuit breaker thresholds; absent = breaker disabled.
    pub breaker: Option<BreakerPolicy>,

    /// Response caching; absent = caching disabled.
    pub cache: Option<CachePolicy>,

    /// Rate limiting; absent = unlimited.
    pub rate_limit: Option<RateLimitPolicy>,

    /// Authentication requirement; absent = anonymous allowed.
    pub auth: Option<AuthPolicy>,

    /// Request/response transformer references.
    pub transforms: TransformRefs,

    /// Active health checking; absent = never probed.
    pub health_check: Option<HealthCheckPolicy>,

    /// Static response for Mock routes.
    pub mock: Option<MockPolicy>,

    /// Status used by Redirect routes.
    pub redirect_status: u16,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            query: HashMap::new(),
            timeout_ms: 30_000,
            retries: 0,
            breaker: None,
            cache: None,
            rate_limit: None,
            auth: None,
            transforms: TransformRefs::default(),
            health_check: None,
            mock: None,
            redirect_status: 302,
        }
    }
}

/// A routing rule, loaded from the external route source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Unique route identifier.
    pub id: String,

    /// Owning tenant; `None` means the route is global.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Human-readable name for logging/metrics.
    pub name: String,

    /// Handling strategy.
    #[serde(rename = "type")]
    pub kind: RouteType,

    /// Accepted HTTP verbs.
    #[serde(default)]
    pub methods: MethodSet,

    /// Path template: literal segments, `:name` params, optional trailing `*`.
    pub path: String,

    /// Upstream base reference (Proxy/Webhook/Redirect) or handler hint.
    pub target: String,

    /// Lifecycle state; only Active routes match.
    #[serde(default = "default_status")]
    pub status: RouteStatus,

    /// Higher priority wins among routes matching the same request.
    #[serde(default)]
    pub priority: i32,

    /// Per-route configuration bundle.
    #[serde(default)]
    pub config: RouteSettings,
}

fn default_status() -> RouteStatus {
    RouteStatus::Active
}

impl Route {
    /// Minimal active route, used heavily by tests.
    pub fn new(id: impl Into<String>, kind: RouteType, path: impl Into<String>, target: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tenant_id: None,
            kind,
            methods: MethodSet::all(),
            path: path.into(),
            target: target.into(),
            status: RouteStatus::Active,
            priority: 0,
            config: RouteSettings::default(),
        }
    }

    /// Does this route accept requests from the given tenant?
    /// Global routes (no tenant id) accept any tenant.
    pub fn accepts_tenant(&self, tenant: Option<&str>) -> bool {
        match &self.tenant_id {
            None => true,
            Some(own) => tenant == Some(own.as_str()),
        }
    }
}
