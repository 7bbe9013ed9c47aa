//! Route registration seam.
//!
//! Business routes are supplied from outside; this crate only attaches them
//! beneath the middleware chain. A built-in `/health` route is provided for
//! the binary.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

/// Attaches (path, method, handler) bindings to the terminal router.
pub trait RouteRegistrar {
    fn register(self, router: Router) -> Router;
}

impl<F> RouteRegistrar for F
where
    F: FnOnce(Router) -> Router,
{
    fn register(self, router: Router) -> Router {
        self(router)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub environment: String,
    pub version: &'static str,
}

async fn health(State(environment): State<String>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        environment,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Registrar that adds `GET /health` reporting the environment label.
pub fn health_routes(environment: impl Into<String>) -> impl RouteRegistrar {
    let environment = environment.into();
    move |router: Router| {
        router.merge(
            Router::new()
                .route("/health", get(health))
                .with_state(environment),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_environment() {
        let app = health_routes("staging").register(Router::new());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["environment"], "staging");
    }

    #[test]
    fn closures_are_registrars() {
        let mut called = false;
        let _ = (|router: Router| {
            called = true;
            router
        })
        .register(Router::new());
        assert!(called);
    }
}
