//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (coordinator.rs):
//!     Provisioners register hooks → run_starts (registration order)
//!     → each start under its own deadline → Running
//!
//! Shutdown (coordinator.rs):
//!     signals.rs fires → run_stops (reverse order)
//!     → shared shutdown budget → errors aggregated → Stopped
//! ```
//!
//! # Design Decisions
//! - Ordered startup: resources first, then the listener (traffic only when ready)
//! - Ordered shutdown: listener drains first, then cache, then database
//! - Shutdown has timeout: pending stops are abandoned after the deadline

pub mod coordinator;
pub mod hook;
pub mod signals;

pub use coordinator::{
    HookError, Lifecycle, LifecycleError, Phase, ShutdownError, StopFailure,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use hook::{BoxError, Hook};
pub use signals::shutdown_signal;
