//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Every problem is
//! reported, not just the first, so one failed start shows the whole list.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::http::middleware::cors::{CorsConfigError, CorsPolicy};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("shutdown.drain_timeout_secs must be greater than zero")]
    ZeroDrainTimeout,

    #[error("observability.log_format '{0}' is not one of: pretty, json")]
    LogFormat(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error(transparent)]
    Cors(#[from] CorsConfigError),
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDrainTimeout);
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::LogFormat(observability.log_format.clone()));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if let Err(e) = CorsPolicy::from_config(&config.cors) {
        errors.push(e.into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.cors.primary_origin = "https://app.example.com".into();
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn missing_primary_origin_is_rejected() {
        let errors = validate_config(&ServiceConfig::default()).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Cors(CorsConfigError::NoOrigins)]
        );
    }

    #[test]
    fn reports_all_errors() {
        let mut config = valid();
        config.listener.bind_address = "not-an-address".into();
        config.listener.max_connections = 0;
        config.shutdown.drain_timeout_secs = 0;
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroDrainTimeout));
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = valid();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MetricsAddress("nowhere".into())]
        );
    }
}
