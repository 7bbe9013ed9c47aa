//! API service host: lifecycle controller and request pipeline.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServiceConfig;
pub use http::{HttpServer, MiddlewareChain};
pub use lifecycle::{LifecycleController, LifecycleState, Shutdown, ShutdownOutcome};
