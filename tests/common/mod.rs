//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use api_host::config::ServiceConfig;
use api_host::http::RouteRegistrar;
use api_host::lifecycle::{LifecycleController, RunningService};

pub const APP_ORIGIN: &str = "https://app.example.com";
pub const EVIL_ORIGIN: &str = "https://evil.example.com";

/// Config bound to an ephemeral local port.
pub fn test_config(drain_timeout_secs: u64) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.environment = "test".into();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.cors.primary_origin = APP_ORIGIN.into();
    config.shutdown.drain_timeout_secs = drain_timeout_secs;
    config
}

/// Start a controller and return it alongside the running service.
pub async fn start<R: RouteRegistrar>(
    config: ServiceConfig,
    routes: R,
) -> (LifecycleController, RunningService) {
    let controller = LifecycleController::new(config);
    let running = controller.start(routes).await.expect("service should start");
    (controller, running)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn url(running: &RunningService, path: &str) -> String {
    format!("http://{}{}", running.local_addr(), path)
}
