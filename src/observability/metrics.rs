//! Metrics collection and exposition.
//!
//! # Metrics
//! - `api_requests_total` (counter): requests by status
//! - `api_request_duration_seconds` (histogram): latency distribution
//! - `api_panics_recovered_total` (counter): handler faults turned into 500s
//! - `api_active_connections` (gauge): current connection count
//! - `api_shutdowns_total` (counter): shutdowns by outcome

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, latency: Duration) {
    counter!("api_requests_total", "status" => status.to_string()).increment(1);
    histogram!("api_request_duration_seconds").record(latency.as_secs_f64());
}

pub fn record_recovered_panic() {
    counter!("api_panics_recovered_total").increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("api_active_connections").set(count as f64);
}

pub fn record_shutdown(outcome: &'static str) {
    counter!("api_shutdowns_total", "outcome" => outcome).increment(1);
}
