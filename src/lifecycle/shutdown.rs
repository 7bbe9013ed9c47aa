//! Shutdown coordination for the service.

use std::sync::Arc;
use std::process::ExitCode;

use tokio::sync::watch;

/// One-shot, idempotent shutdown trigger.
///
/// Cloned handles share the same trigger. Once fired it stays fired, so
/// tasks that start waiting late still observe it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the trigger. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        let fired = self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        });

        if fired {
            tracing::info!("Shutdown triggered");
        } else {
            tracing::debug!("Shutdown already in progress; trigger ignored");
        }
        fired
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the trigger has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender is owned by `self`, so the channel stays open.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// How the drain phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight connection finished before the deadline.
    Clean { drained: u64 },
    /// The deadline elapsed; remaining connections were aborted.
    Forced { aborted: u64 },
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownOutcome::Clean { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownOutcome::Clean { .. } => "clean",
            ShutdownOutcome::Forced { .. } => "forced",
        }
    }

    /// Numeric process exit status: 0 for a clean drain, 1 otherwise.
    pub fn exit_status(&self) -> u8 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        assert!(!shutdown.is_triggered());

        assert!(shutdown.trigger());
        assert!(!other.trigger());
        assert!(!shutdown.trigger());
        assert!(other.is_triggered());
    }

    #[tokio::test]
    async fn late_waiters_see_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .expect("already-fired trigger resolves immediately");
    }

    #[tokio::test]
    async fn waiters_wake_on_trigger() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn outcome_classification() {
        assert!(ShutdownOutcome::Clean { drained: 3 }.is_clean());
        assert!(!ShutdownOutcome::Forced { aborted: 1 }.is_clean());
        assert_eq!(ShutdownOutcome::Forced { aborted: 1 }.as_str(), "forced");
    }

    #[test]
    fn exit_codes_follow_outcome() {
        let clean = ShutdownOutcome::Clean { drained: 0 };
        let forced = ShutdownOutcome::Forced { aborted: 2 };
        assert_eq!(clean.exit_status(), 0);
        assert_eq!(forced.exit_status(), 1);

        // ExitCode has no stable accessor for its value; compare renderings.
        let render = |code: ExitCode| format!("{code:?}");
        assert_eq!(render(clean.exit_code()), render(ExitCode::SUCCESS));
        assert_eq!(render(forced.exit_code()), render(ExitCode::FAILURE));
    }
}
