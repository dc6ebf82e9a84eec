//! Gateway dispatch engine.
//!
//! Accepts a normalized inbound request, matches it to a configured
//! route, enforces resilience policies (auth gate, rate limiting,
//! circuit breaking), consults the response cache, and dispatches to one
//! of five route-type handlers (proxy, redirect, function, mock,
//! webhook), while background tasks maintain per-route health and
//! metrics state.

pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod health;
pub mod http;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod transform;
pub mod upstream;

pub use config::EngineConfig;
pub use context::{Principal, RequestContext, ResponseContext};
pub use dispatch::Dispatcher;
pub use engine::Engine;
pub use error::{GatewayError, GatewayResult};
pub use http::GatewayServer;
pub use routing::{Route, RouteType};
