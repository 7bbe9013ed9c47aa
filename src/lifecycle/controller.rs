//! Lifecycle controller: startup, serving, draining.
//!
//! # Responsibilities
//! - Build the middleware chain and bind the listener (`Starting`)
//! - Run the accept loop until the shutdown trigger fires (`Serving`)
//! - Drain in-flight connections within the deadline (`Draining`)
//! - Report a clean or forced stop (`Stopped`), or a startup failure (`Failed`)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and never retried
//! - Listener binds last, so traffic only arrives once the chain exists

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::http::middleware::{ChainError, MiddlewareChain};
use crate::http::{HttpServer, RouteRegistrar};
use crate::lifecycle::signals::SignalListener;
use crate::lifecycle::state::{LifecycleState, StateCell, TransitionError};
use crate::lifecycle::{Shutdown, ShutdownOutcome};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;

/// Errors that end the lifecycle without a drain.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to build middleware chain: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Bind(#[from] ListenerError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("serve task ended abnormally: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Process exit status for the result of [`LifecycleController::run`].
///
/// 0 only for a clean drain; a forced drain or any startup error is 1.
pub fn exit_status(result: &Result<ShutdownOutcome, LifecycleError>) -> u8 {
    match result {
        Ok(outcome) => outcome.exit_status(),
        Err(_) => 1,
    }
}

pub fn exit_code(result: &Result<ShutdownOutcome, LifecycleError>) -> ExitCode {
    ExitCode::from(exit_status(result))
}

/// Owns the configuration and drives the service through its states.
#[derive(Debug, Clone)]
pub struct LifecycleController {
    config: Arc<ServiceConfig>,
    state: StateCell,
    shutdown: Shutdown,
}

impl LifecycleController {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: StateCell::new(),
            shutdown: Shutdown::new(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    /// Observe state transitions as they happen.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Handle that fires the (idempotent) shutdown trigger.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn drain_deadline(&self) -> Duration {
        Duration::from_secs(self.config.shutdown.drain_timeout_secs)
    }

    /// Perform `Starting` and enter `Serving`.
    ///
    /// On error the state is `Failed` and nothing is listening.
    pub async fn start<R: RouteRegistrar>(&self, routes: R) -> Result<RunningService, LifecycleError> {
        match self.prepare(routes).await {
            Ok((listener, app)) => {
                let address = listener.local_addr().map_err(|source| {
                    self.fail();
                    ListenerError::Accept(source)
                })?;
                self.state.transition(LifecycleState::Serving)?;
                tracing::info!(
                    address = %address,
                    environment = %self.config.environment,
                    "Serving"
                );

                let controller = self.clone();
                let task = tokio::spawn(async move { controller.serve(listener, app).await });
                Ok(RunningService {
                    address,
                    shutdown: self.shutdown.clone(),
                    task,
                })
            }
            Err(e) => {
                self.fail();
                tracing::error!(error = %e, "Startup failed");
                Err(e)
            }
        }
    }

    /// Start, serve until SIGINT/SIGTERM, and drain.
    pub async fn run<R: RouteRegistrar>(&self, routes: R) -> Result<ShutdownOutcome, LifecycleError> {
        let signals = SignalListener::install().map_err(|e| {
            self.fail();
            LifecycleError::Signals(e)
        })?;

        let running = self.start(routes).await?;
        let signal_task = tokio::spawn(signals.forward_to(self.shutdown.clone()));

        let outcome = running.wait().await;
        signal_task.abort();
        outcome
    }

    async fn prepare<R: RouteRegistrar>(&self, routes: R) -> Result<(Listener, Router), LifecycleError> {
        let chain = MiddlewareChain::build(&self.config)?;
        let app = chain.apply(routes.register(Router::new()));
        let listener = Listener::bind(&self.config.listener).await?;
        Ok((listener, app))
    }

    async fn serve(self, listener: Listener, app: Router) -> Result<ShutdownOutcome, LifecycleError> {
        let in_flight = HttpServer::new(app).serve(listener, &self.shutdown).await;

        self.state.transition(LifecycleState::Draining)?;
        let outcome = in_flight.drain(self.drain_deadline()).await;
        self.state.transition(LifecycleState::Stopped)?;

        metrics::record_shutdown(outcome.as_str());
        match outcome {
            ShutdownOutcome::Clean { drained } => {
                tracing::info!(drained, "Shutdown complete");
            }
            ShutdownOutcome::Forced { aborted } => {
                tracing::error!(aborted, "Forced shutdown after drain deadline");
            }
        }
        Ok(outcome)
    }

    fn fail(&self) {
        if let Err(e) = self.state.transition(LifecycleState::Failed) {
            tracing::debug!(error = %e, "Failed state not applied");
        }
    }
}

/// A service in `Serving`, returned by [`LifecycleController::start`].
#[derive(Debug)]
pub struct RunningService {
    address: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<ShutdownOutcome, LifecycleError>>,
}

impl RunningService {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Fire the shutdown trigger. Returns `false` if it had already fired.
    pub fn shutdown(&self) -> bool {
        self.shutdown.trigger()
    }

    /// Wait for the drain to finish.
    pub async fn wait(self) -> Result<ShutdownOutcome, LifecycleError> {
        self.task.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.cors.primary_origin = "https://app.example.com".into();
        config.shutdown.drain_timeout_secs = 1;
        config
    }

    fn routes(router: Router) -> Router {
        router.route("/", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn idle_service_stops_cleanly() {
        let controller = LifecycleController::new(config());
        assert_eq!(controller.state(), LifecycleState::Starting);

        let running = controller.start(routes).await.unwrap();
        assert_eq!(controller.state(), LifecycleState::Serving);

        assert!(running.shutdown());
        let outcome = running.wait().await.unwrap();
        assert_eq!(outcome, ShutdownOutcome::Clean { drained: 0 });
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn invalid_cors_config_fails_before_binding() {
        let mut config = config();
        config.cors.primary_origin = String::new();
        let controller = LifecycleController::new(config);

        let err = controller.start(routes).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Chain(_)));
        assert_eq!(controller.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn occupied_port_fails() {
        let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = config();
        config.listener.bind_address = holder.local_addr().unwrap().to_string();
        let controller = LifecycleController::new(config);

        let err = controller.start(routes).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Bind(ListenerError::Bind { .. })));
        assert_eq!(controller.state(), LifecycleState::Failed);
        assert_eq!(exit_status(&Err(err)), 1);
    }

    #[test]
    fn run_results_map_to_exit_status() {
        assert_eq!(exit_status(&Ok(ShutdownOutcome::Clean { drained: 4 })), 0);
        assert_eq!(exit_status(&Ok(ShutdownOutcome::Forced { aborted: 1 })), 1);

        let bind = LifecycleError::Bind(ListenerError::Bind {
            address: "127.0.0.1:8080".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        });
        assert_eq!(exit_status(&Err(bind)), 1);

        let render = |code: ExitCode| format!("{code:?}");
        let failed: Result<ShutdownOutcome, LifecycleError> =
            Err(LifecycleError::Bind(ListenerError::Closed));
        assert_eq!(render(exit_code(&failed)), render(ExitCode::FAILURE));
        assert_eq!(
            render(exit_code(&Ok(ShutdownOutcome::Clean { drained: 0 }))),
            render(ExitCode::SUCCESS)
        );
    }

    #[tokio::test]
    async fn trigger_before_start_stops_immediately() {
        let controller = LifecycleController::new(config());
        controller.shutdown_handle().trigger();

        let running = controller.start(routes).await.unwrap();
        let outcome = running.wait().await.unwrap();
        assert!(outcome.is_clean());
    }
}
