//! Lifecycle state machine.
//!
//! ```text
//! Starting ──► Serving ──► Draining ──► Stopped
//!     │           │
//!     └──► Failed ◄┘
//! ```
//!
//! Transitions are checked and applied atomically on a watch channel; any
//! other move is rejected and leaves the state untouched.

use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Starting, Serving)
                | (Starting, Failed)
                | (Serving, Draining)
                | (Serving, Failed)
                | (Draining, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid lifecycle transition {from} → {to}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Shared, serialized holder of the current state.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: std::sync::Arc<watch::Sender<LifecycleState>>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Starting);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Apply `to` if it is a legal successor of the current state.
    pub fn transition(&self, to: LifecycleState) -> Result<LifecycleState, TransitionError> {
        let mut from = LifecycleState::Starting;
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            from = *state;
            applied = state.can_transition_to(to);
            if applied {
                *state = to;
            }
            applied
        });

        if applied {
            tracing::debug!(from = %from, to = %to, "Lifecycle transition");
            Ok(from)
        } else {
            Err(TransitionError { from, to })
        }
    }

    /// Receiver that observes every applied transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn happy_path_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.current(), Starting);
        assert_eq!(cell.transition(Serving), Ok(Starting));
        assert_eq!(cell.transition(Draining), Ok(Serving));
        assert_eq!(cell.transition(Stopped), Ok(Draining));
        assert!(cell.current().is_terminal());
    }

    #[test]
    fn illegal_transitions_leave_state_untouched() {
        let cell = StateCell::new();
        assert_eq!(
            cell.transition(Draining),
            Err(TransitionError { from: Starting, to: Draining })
        );
        assert_eq!(cell.current(), Starting);

        cell.transition(Failed).unwrap();
        assert!(cell.transition(Serving).is_err());
        assert_eq!(cell.current(), Failed);
    }

    #[test]
    fn draining_twice_is_rejected() {
        let cell = StateCell::new();
        cell.transition(Serving).unwrap();
        cell.transition(Draining).unwrap();
        assert!(cell.transition(Draining).is_err());
        assert_eq!(cell.current(), Draining);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();

        cell.transition(Serving).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Serving);
    }
}
