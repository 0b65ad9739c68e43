//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional config file (TOML, loader.rs)
//!     → environment overlay (env.rs, case-insensitive keys)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup and never mutated afterwards
//! - All fields have defaults to allow minimal configs
//! - Resource enablement is derived from connection fields, never set directly

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, Config, DbConfig, Environment, HttpConfig, RedisConfig};
