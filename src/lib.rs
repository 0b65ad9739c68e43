//! Service bootstrap library.
//!
//! Provisions optional PostgreSQL and Redis resources, serves HTTP, and
//! sequences startup and shutdown through one lifecycle coordinator.

pub mod app;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod resource;

pub use app::{App, AppError, Policies};
pub use config::Config;
pub use http::AppState;
pub use lifecycle::Lifecycle;
pub use resource::{Cache, Database, ResourceError};
