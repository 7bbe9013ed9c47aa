//! Panic recovery for the request pipeline.
//!
//! Runs the rest of the chain inside `catch_unwind`. A panic anywhere below
//! is logged and turned into a single `500` with a JSON `{"error": ...}`
//! body; the connection and the process keep going.
//!
//! The unwind skips every stage below, so this stage also fixes the request
//! id up front and applies the CORS decision to the 500 itself.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::http::middleware::cors::CorsPolicy;
use crate::http::middleware::logging::{self, X_REQUEST_ID};
use crate::http::middleware::RequestContext;
use crate::observability::metrics;

/// Message returned to clients when a handler faults.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Fixed shape of error bodies written by the service itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Middleware entry point for the recovery stage.
pub async fn recovery_middleware(
    State(cors): State<Arc<CorsPolicy>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let request_id = logging::ensure_request_id(&mut req);
    let origin = cors.check_origin(req.headers());
    let mut context = RequestContext::from_request(&req);
    req.extensions_mut().insert(context.clone());

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            context.mark_faulted();
            let elapsed = context.elapsed();
            let logged_id = request_id
                .as_ref()
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::error!(
                request_id = %logged_id,
                method = %context.method(),
                uri = %context.uri(),
                version = ?context.version(),
                elapsed_ms = elapsed.as_millis() as u64,
                panic = %panic_message(payload.as_ref()),
                "Handler panicked; returning 500"
            );
            metrics::record_recovered_panic();
            metrics::record_request(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), elapsed);

            let mut response = fault_response(context);
            if let Some(id) = request_id {
                response.headers_mut().insert(X_REQUEST_ID.clone(), id);
            }
            cors.decorate(origin, response.headers_mut());
            response
        }
    }
}

/// Build the response written in place of a faulted one.
pub fn fault_response(context: RequestContext) -> Response {
    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(INTERNAL_ERROR_MESSAGE)),
    )
        .into_response();
    response.extensions_mut().insert(context);
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, HeaderValue},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use crate::config::CorsConfig;

    const APP: &str = "https://app.example.com";

    fn policy() -> Arc<CorsPolicy> {
        let config = CorsConfig {
            primary_origin: APP.into(),
            ..CorsConfig::default()
        };
        Arc::new(CorsPolicy::from_config(&config).unwrap())
    }

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route(
                "/boom",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .layer(middleware::from_fn_with_state(policy(), recovery_middleware))
    }

    async fn send(app: Router, path: &str) -> Response {
        app.oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn send_from(app: Router, path: &str, origin: &str) -> Response {
        let req = Request::get(path)
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        app.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn panic_becomes_json_500() {
        let response = send(app(), "/boom").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let context = response.extensions().get::<RequestContext>().cloned().unwrap();
        assert!(context.is_faulted());
        assert_eq!(context.uri().path(), "/boom");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, ErrorBody::new(INTERNAL_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn healthy_requests_pass_through() {
        let app = app();
        assert_eq!(
            send(app.clone(), "/boom").await.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let response = send(app, "/ok").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.extensions().get::<RequestContext>().is_none());
    }

    #[tokio::test]
    async fn fault_response_carries_cors_and_request_id() {
        let response = send_from(app(), "/boom", APP).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], APP);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(response.headers()[header::VARY], "origin");
        assert!(response.headers().contains_key(&X_REQUEST_ID));

        let response = send_from(app(), "/boom", "https://evil.example.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(response.headers()[header::VARY], "origin");
    }

    #[tokio::test]
    async fn fault_response_echoes_client_request_id() {
        let req = Request::get("/boom")
            .header(&X_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get(&X_REQUEST_ID),
            Some(&HeaderValue::from_static("abc-123"))
        );
    }

    #[test]
    fn panic_message_extraction() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
