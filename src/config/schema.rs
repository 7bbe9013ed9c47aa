//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Deployment label (e.g., "development", "production").
    pub environment: String,

    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Drain behaviour on shutdown.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            listener: ListenerConfig::default(),
            cors: CorsConfig::default(),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Cross-origin resource sharing policy.
///
/// There is deliberately no default primary origin: a deployment must name
/// the browser origin it serves.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origin of the main web application (e.g., "https://app.example.com").
    pub primary_origin: String,

    /// Optional second origin, typically the landing page.
    pub secondary_origin: Option<String>,

    /// Methods a cross-origin request may use.
    pub allowed_methods: Vec<String>,

    /// Request headers a cross-origin request may send.
    pub allowed_headers: Vec<String>,

    /// Response headers exposed to browser scripts.
    pub exposed_headers: Vec<String>,

    /// Emit `Access-Control-Allow-Credentials: true`.
    pub allow_credentials: bool,

    /// How long browsers may cache a preflight result, in seconds.
    pub max_age_secs: u64,
}

impl CorsConfig {
    /// The ordered, de-duplicated set of allowed origins.
    ///
    /// A missing or blank secondary origin contributes nothing.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = Vec::with_capacity(2);
        let candidates = std::iter::once(self.primary_origin.as_str())
            .chain(self.secondary_origin.as_deref());

        for origin in candidates.map(str::trim) {
            if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
                origins.push(origin.to_string());
            }
        }
        origins
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            primary_origin: String::new(),
            secondary_origin: None,
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: ["Accept", "Authorization", "Content-Type", "X-Request-Id"]
                .into_iter()
                .map(String::from)
                .collect(),
            exposed_headers: vec!["X-Request-Id".to_string()],
            allow_credentials: true,
            max_age_secs: 12 * 60 * 60,
        }
    }
}

/// Shutdown drain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on the drain phase, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
