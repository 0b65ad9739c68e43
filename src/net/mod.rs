//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Start hook
//!     → listener.rs (bind, spawn serve loop)
//!     → accept under connection limit
//!     → connection.rs (tracking guard per connection)
//!     → hyper auto builder → axum router
//!
//! Stop hook
//!     → stop accepting, drop socket
//!     → graceful drain (bounded) → abort stragglers
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Serve loop failures are logged, never escalated

pub mod connection;
pub mod listener;

pub use listener::{drain_budget, register, ListenerError, ListenerHandle, ListenerSettings};
