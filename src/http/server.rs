//! HTTP server: accept loop and connection draining.
//!
//! # Responsibilities
//! - Accept connections until the shutdown trigger fires
//! - Serve each connection (HTTP/1.1 and HTTP/2) on its own task
//! - Stop accepting at once on shutdown, then drain within a deadline
//! - Abort whatever is still running when the deadline elapses

use std::time::Duration;

use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto::Builder, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::lifecycle::{Shutdown, ShutdownOutcome};
use crate::net::{ConnectionPermit, ConnectionTracker, Listener};

/// Pause after a failed accept (e.g. EMFILE) before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP server driving a fully layered router.
pub struct HttpServer {
    app: Router,
    builder: Builder<TokioExecutor>,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a server for `app`, which must already carry the middleware chain.
    pub fn new(app: Router) -> Self {
        Self {
            app,
            builder: Builder::new(TokioExecutor::new()),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Accept and serve connections until `shutdown` fires.
    ///
    /// The listener is dropped before returning, so nothing accepted after
    /// the trigger is ever dispatched. Returns the connections still in
    /// flight.
    pub async fn serve(self, listener: Listener, shutdown: &Shutdown) -> InFlight {
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        let stop = shutdown.wait();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;

                _ = &mut stop => break,

                // Reap finished connection tasks so the set stays small.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        self.spawn_connection(stream, peer, permit, &graceful, &mut connections);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed; retrying");
                        tokio::select! {
                            _ = &mut stop => break,
                            _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        drop(listener);
        tracing::info!(
            in_flight = self.tracker.active_count(),
            "Stopped accepting connections"
        );

        InFlight {
            graceful,
            connections,
            tracker: self.tracker,
        }
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: std::net::SocketAddr,
        permit: ConnectionPermit,
        graceful: &GracefulShutdown,
        connections: &mut JoinSet<()>,
    ) {
        let guard = self.tracker.track();
        let service = TowerToHyperService::new(self.app.clone());
        let conn = self
            .builder
            .serve_connection(TokioIo::new(stream), service)
            .into_owned();
        let conn = graceful.watch(conn);

        tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, "Serving connection");

        connections.spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(
                    connection_id = %guard.id(),
                    peer_addr = %peer,
                    error = %e,
                    "Connection ended with error"
                );
            }
            drop(permit);
            drop(guard);
        });
    }
}

/// Connections accepted before the shutdown trigger.
pub struct InFlight {
    graceful: GracefulShutdown,
    connections: JoinSet<()>,
    tracker: ConnectionTracker,
}

impl InFlight {
    /// Let in-flight requests finish, bounded by `deadline`.
    ///
    /// Idle keep-alive connections are closed immediately; busy ones close
    /// after their current response. Anything left at the deadline is aborted.
    pub async fn drain(self, deadline: Duration) -> ShutdownOutcome {
        let Self {
            graceful,
            mut connections,
            tracker,
        } = self;

        let in_flight = tracker.active_count();
        tracing::info!(
            in_flight,
            deadline_secs = deadline.as_secs_f64(),
            "Draining in-flight connections"
        );

        let drained = async {
            graceful.shutdown().await;
            tracker.wait_idle().await;
        };

        if tokio::time::timeout(deadline, drained).await.is_ok() {
            while connections.join_next().await.is_some() {}
            tracing::info!(drained = in_flight, "All connections drained");
            return ShutdownOutcome::Clean { drained: in_flight };
        }

        let aborted = tracker.active_count();
        tracing::error!(
            aborted,
            deadline_secs = deadline.as_secs_f64(),
            "Drain deadline exceeded; aborting remaining connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}

        ShutdownOutcome::Forced { aborted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::config::ListenerConfig;

    #[tokio::test]
    async fn trigger_cuts_accept_backoff_short() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections: 1,
        };
        let listener = Listener::bind(&config).await.unwrap();
        // Every accept now fails at once, so the loop sits in its backoff.
        listener.close();

        let shutdown = Shutdown::new();
        let serving = {
            let shutdown = shutdown.clone();
            let server = HttpServer::new(Router::new());
            tokio::spawn(async move { server.serve(listener, &shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let triggered = Instant::now();
        assert!(shutdown.trigger());
        let in_flight = tokio::time::timeout(Duration::from_secs(1), serving)
            .await
            .unwrap()
            .unwrap();
        assert!(triggered.elapsed() < ACCEPT_ERROR_BACKOFF / 2);

        let outcome = in_flight.drain(Duration::from_secs(1)).await;
        assert_eq!(outcome, ShutdownOutcome::Clean { drained: 0 });
    }
}
