//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper connection, HTTP/1.1 and HTTP/2)
//!     → middleware/ (recovery → logging → cors)
//!     → routes.rs (externally registered handlers)
//!     → response to client
//! ```

pub mod middleware;
pub mod routes;
pub mod server;

pub use middleware::{MiddlewareChain, RequestContext};
pub use routes::{health_routes, RouteRegistrar};
pub use server::{HttpServer, InFlight};
