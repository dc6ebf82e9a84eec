//! Route model, template matching, and the in-memory route index.

pub mod matcher;
pub mod registry;
pub mod route;

pub use registry::RouteRegistry;
pub use route::{Route, RouteStatus, RouteType};
