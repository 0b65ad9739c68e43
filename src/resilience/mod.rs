//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Cache command:
//!     → per-command read/write timeout (resource::cache)
//!     → On transient failure: retries.rs (bounded attempts)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Retries are a per-operation driver policy, never applied to startup probes
//! - Only transient failures (I/O, timeouts, pool exhaustion) are retried
//! - Jittered backoff prevents thundering herd

pub mod backoff;
pub mod retries;
