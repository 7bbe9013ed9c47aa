//! Configuration loading from disk and the process environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Deployment label.
pub const ENV_ENVIRONMENT: &str = "APP_ENV";
/// Replaces the port of `listener.bind_address`.
pub const ENV_PORT: &str = "APP_PORT";
/// Primary allowed CORS origin.
pub const ENV_CORS_ORIGIN: &str = "APP_CORS_ORIGIN";
/// Secondary allowed CORS origin; blank means none.
pub const ENV_CORS_SECONDARY_ORIGIN: &str = "APP_CORS_SECONDARY_ORIGIN";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { key: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load, override from the environment, and validate configuration.
///
/// Without a path the defaults are used as the base.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(environment) = lookup(ENV_ENVIRONMENT) {
        config.environment = environment;
    }

    if let Some(raw) = lookup(ENV_PORT) {
        let port: u16 = raw.trim().parse().map_err(|_| ConfigError::Env {
            key: ENV_PORT,
            value: raw.clone(),
        })?;
        // An unparseable bind address is left for validation to report.
        if let Ok(mut addr) = config.listener.bind_address.parse::<SocketAddr>() {
            addr.set_port(port);
            config.listener.bind_address = addr.to_string();
        }
    }

    if let Some(origin) = lookup(ENV_CORS_ORIGIN) {
        config.cors.primary_origin = origin.trim().to_string();
    }

    if let Some(origin) = lookup(ENV_CORS_SECONDARY_ORIGIN) {
        let origin = origin.trim();
        config.cors.secondary_origin = (!origin.is_empty()).then(|| origin.to_string());
    }

    Ok(())
}
