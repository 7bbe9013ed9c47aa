//! API service host.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │               LIFECYCLE CONTROLLER           │
//!                     │  Starting → Serving → Draining → Stopped     │
//!                     │      └──────────┴──────► Failed              │
//!                     └──────┬────────────────────────────▲──────────┘
//!                            │ accept loop                │ SIGINT/SIGTERM
//!     Client Request         ▼                            │
//!     ───────────────▶ ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐
//!                      │ recovery │──▶│ logging │──▶│   cors   │──▶│ handler │
//!     ◀─────────────── └──────────┘   └─────────┘   └──────────┘   └─────────┘
//!     Client Response    (500 on       (request id,   (OPTIONS
//!                         panic)        access log)    answered here)
//! ```
//!
//! # Exit Codes
//! - 0: clean shutdown
//! - 1: invalid configuration, bind failure, or drain deadline exceeded

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use api_host::config::{load_config, ObservabilityConfig};
use api_host::http::health_routes;
use api_host::observability::{logging, metrics};
use api_host::lifecycle::{self, LifecycleController};

#[derive(Parser)]
#[command(name = "api-host")]
#[command(about = "Runs the API service until SIGINT/SIGTERM, then drains", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "APP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let _ = logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("failed to initialize logging: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        bind_address = %config.listener.bind_address,
        allowed_origins = ?config.cors.allowed_origins(),
        drain_timeout_secs = config.shutdown.drain_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let routes = health_routes(config.environment.clone());
    let controller = LifecycleController::new(config);

    let result = controller.run(routes).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, state = %controller.state(), "Service failed");
    }
    lifecycle::exit_code(&result)
}
