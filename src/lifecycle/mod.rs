//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (controller.rs):
//!     Build middleware chain → Bind listener → Serving
//!
//! Shutdown (shutdown.rs):
//!     Trigger fired → Stop accepting → Drain connections → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Fire the shutdown trigger (once)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: chain first, listener last
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has a deadline: forced stop after it, reported as non-zero exit

pub mod controller;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use controller::{exit_code, exit_status, LifecycleController, LifecycleError, RunningService};
pub use shutdown::{Shutdown, ShutdownOutcome};
pub use state::{LifecycleState, StateCell, TransitionError};
