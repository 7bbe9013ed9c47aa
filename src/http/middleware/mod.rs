//! Request pipeline assembled in front of every route handler.
//!
//! # Data Flow
//! ```text
//! request
//!     → recovery.rs (catch panics from everything below)
//!     → logging.rs  (request id, span, access log)
//!     → cors.rs     (origin policy; answers OPTIONS itself)
//!     → route handler
//! ```
//!
//! # Design Decisions
//! - Recovery is outermost so no fault escapes to the transport; it shares
//!   the CORS policy so a recovered 500 is still readable cross-origin
//! - CORS sits directly above the handler so rejected preflights never reach it
//! - The chain is built once and shared read-only by every connection

pub mod cors;
pub mod logging;
pub mod recovery;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Method, Request, Uri, Version},
    middleware, Router,
};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use self::cors::{CorsConfigError, CorsPolicy};
use self::logging::{MakeRequestUuidV4, X_REQUEST_ID};

pub use self::cors::OriginDecision;
pub use self::recovery::ErrorBody;

/// The interceptors, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Recovery,
    Logging,
    Cors,
}

/// Failure to assemble the chain. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid CORS policy: {0}")]
    Cors(#[from] CorsConfigError),
}

/// Ordered, immutable request pipeline.
#[derive(Debug, Clone)]
pub struct MiddlewareChain {
    cors: Arc<CorsPolicy>,
}

impl MiddlewareChain {
    /// Order in which requests pass through the chain.
    pub const STAGES: [Stage; 3] = [Stage::Recovery, Stage::Logging, Stage::Cors];

    /// Build the chain from configuration, failing fast on invalid policy.
    pub fn build(config: &ServiceConfig) -> Result<Self, ChainError> {
        let cors = CorsPolicy::from_config(&config.cors)?;
        Ok(Self {
            cors: Arc::new(cors),
        })
    }

    pub fn stages(&self) -> &'static [Stage] {
        &Self::STAGES
    }

    pub fn cors_policy(&self) -> &CorsPolicy {
        &self.cors
    }

    /// Wrap every route (and the fallback) of `router` in the chain.
    pub fn apply(&self, router: Router) -> Router {
        // ServiceBuilder layers run top to bottom: the first is outermost.
        let stack = ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(
                self.cors.clone(),
                recovery::recovery_middleware,
            ))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuidV4))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(logging::make_request_span)
                    .on_response(logging::log_response),
            )
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
            .layer(middleware::from_fn_with_state(
                self.cors.clone(),
                cors::cors_middleware,
            ));

        router.layer(stack)
    }
}

/// Per-request bookkeeping created by the recovery stage.
///
/// Inserted into request extensions so handlers can read it, and attached to
/// the response when the request faulted.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    version: Version,
    started_at: Instant,
    faulted: bool,
}

impl RequestContext {
    pub fn from_request(req: &Request<Body>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            started_at: Instant::now(),
            faulted: false,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub(crate) fn mark_faulted(&mut self) {
        self.faulted = true;
    }
}
