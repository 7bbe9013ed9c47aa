//! Access logging stage.
//!
//! Assigns every request an `x-request-id` (UUID v4 unless the client sent
//! one), opens a tracing span around it, logs the outcome with latency, and
//! echoes the id on the response.

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

use crate::observability::metrics;

/// Header carrying the per-request correlation id.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Return the request's `x-request-id`, generating and inserting one first
/// if the client sent none.
///
/// `SetRequestIdLayer` keeps an id that is already present, so calling this
/// above it fixes the id for the whole chain.
pub fn ensure_request_id(req: &mut Request<Body>) -> Option<HeaderValue> {
    if let Some(id) = req.headers().get(&X_REQUEST_ID) {
        return Some(id.clone());
    }
    let id = MakeRequestUuidV4.make_request_id(req)?.into_header_value();
    req.headers_mut().insert(X_REQUEST_ID.clone(), id.clone());
    Some(id)
}

/// Span opened for each request.
pub fn make_request_span(req: &Request<Body>) -> Span {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    )
}

/// Access-log line written once the response head is ready.
pub fn log_response(res: &Response<Body>, latency: Duration, _span: &Span) {
    let status = res.status();
    let latency_ms = latency.as_secs_f64() * 1000.0;

    if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), latency_ms, "Request completed");
    } else {
        tracing::info!(status = status.as_u16(), latency_ms, "Request completed");
    }
    metrics::record_request(status.as_u16(), latency);
}
