//! OS signal handling.
//!
//! SIGINT and SIGTERM are subscribed exactly once. The first delivery fires
//! the shutdown trigger; later ones are logged and otherwise ignored while the
//! drain deadline runs its course.

use tokio::signal;

use crate::lifecycle::Shutdown;

/// Which termination signal arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

/// Subscribed termination signal sources.
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl SignalListener {
    /// Register handlers. Must be called from within a Tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next termination signal.
    ///
    /// Returns `None` if the signal streams have closed.
    pub async fn recv(&mut self) -> Option<TerminationSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                s = self.interrupt.recv() => s.map(|_| TerminationSignal::Interrupt),
                s = self.terminate.recv() => s.map(|_| TerminationSignal::Terminate),
            }
        }
        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.ok().map(|_| TerminationSignal::Interrupt)
        }
    }

    /// Fire `shutdown` on the first signal; keep absorbing repeats.
    pub async fn forward_to(mut self, shutdown: Shutdown) {
        while let Some(sig) = self.recv().await {
            if shutdown.trigger() {
                tracing::info!(signal = ?sig, "Termination signal received, draining");
            } else {
                tracing::warn!(signal = ?sig, "Termination signal received while draining; ignored");
            }
        }
    }
}
