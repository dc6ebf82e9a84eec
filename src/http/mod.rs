//! Inbound HTTP surface.

pub mod server;

pub use server::GatewayServer;
