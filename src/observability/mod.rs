//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → Log aggregation (stdout; JSON in deployed environments)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never interpolated messages, for machine parsing
//! - Request ID flows through the HTTP layer
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
