//! Request dispatch: the pipeline orchestrator and the route-type
//! handlers.

pub mod pipeline;
pub mod proxy;

pub use pipeline::Dispatcher;
