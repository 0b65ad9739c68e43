//! External resource provisioning.
//!
//! # Data Flow
//! ```text
//! DbConfig / RedisConfig (enabled derived from identifying fields)
//!     → database.rs / cache.rs provision()
//!         disabled → placeholder variant + no-op stop hook
//!         enabled  → connection string → pool (lazy, no I/O)
//!                  → start hook: bounded liveness probe
//!                  → stop hook: close the pool
//!     → Database / Cache handle shared with request handlers
//! ```
//!
//! # Design Decisions
//! - Live and disabled resources are variants of one type; callers never
//!   check for absence, they get `ResourceError::Disabled` instead
//! - Malformed connection parameters fail before any hook is registered
//! - The liveness probe is never retried; retries belong to data operations

pub mod cache;
pub mod database;
pub mod policy;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::{BoxError, LifecycleError};

pub use cache::Cache;
pub use database::{Database, SqlParam};
pub use policy::PoolPolicy;

/// Kinds of external resources this service can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Postgres,
    Redis,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Postgres => "postgres",
            ResourceKind::Redis => "redis",
        }
    }

    /// Environment variables that enable this resource.
    pub fn env_hint(&self) -> &'static str {
        match self {
            ResourceKind::Postgres => "DB_*",
            ResourceKind::Redis => "REDIS_*",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by provisioned resources.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource is not configured. Returned by every operation on a
    /// disabled placeholder.
    #[error("{} disabled: set {} env vars to enable", .0, .0.env_hint())]
    Disabled(ResourceKind),

    /// Connection parameters could not form a valid connection.
    #[error("invalid {kind} configuration: {reason}")]
    Configuration { kind: ResourceKind, reason: String },

    /// The startup liveness probe failed.
    #[error("{kind} liveness check failed: {source}")]
    Liveness {
        kind: ResourceKind,
        #[source]
        source: BoxError,
    },

    /// A single operation exceeded its read/write timeout.
    #[error("{kind} {operation} timed out after {timeout:?}")]
    Timeout {
        kind: ResourceKind,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("postgres error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Cache(#[from] deadpool_redis::redis::RedisError),

    #[error("redis pool error: {0}")]
    CachePool(#[from] deadpool_redis::PoolError),

    /// Hook registration failed while provisioning.
    #[error("failed to register {kind} hooks: {source}")]
    Registration {
        kind: ResourceKind,
        #[source]
        source: LifecycleError,
    },
}

impl ResourceError {
    /// True for the fixed error returned by disabled placeholders.
    pub fn is_disabled(&self) -> bool {
        matches!(self, ResourceError::Disabled(_))
    }

    /// True for failures worth retrying at the operation level.
    pub fn is_transient(&self) -> bool {
        match self {
            ResourceError::Timeout { .. } => true,
            ResourceError::Cache(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            ResourceError::CachePool(e) => matches!(
                e,
                deadpool_redis::PoolError::Timeout(_) | deadpool_redis::PoolError::Backend(_)
            ),
            ResourceError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut
            ),
            _ => false,
        }
    }
}

/// Mask the password of a connection URL for logging.
pub(crate) fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            let has_password = parsed.password().is_some_and(|p| !p.is_empty());
            // Never log a URL whose password could not be masked.
            if has_password && parsed.set_password(Some("***")).is_err() {
                return "<unparseable>".to_string();
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_masks_password() {
        assert_eq!(
            redact_url("postgres://svc:secret@db:5432/app"),
            "postgres://svc:***@db:5432/app"
        );
        assert_eq!(redact_url("redis://cache:6379"), "redis://cache:6379");
        assert_eq!(redact_url("redis://:hunter2@cache:6379/0"), "redis://:***@cache:6379/0");
        assert_eq!(redact_url("not a url"), "<unparseable>");
    }

    #[test]
    fn test_disabled_error_message() {
        let err = ResourceError::Disabled(ResourceKind::Postgres);
        assert_eq!(err.to_string(), "postgres disabled: set DB_* env vars to enable");
        assert!(err.is_disabled());
        assert!(!err.is_transient());

        let err = ResourceError::Disabled(ResourceKind::Redis);
        assert_eq!(err.to_string(), "redis disabled: set REDIS_* env vars to enable");
    }

    #[test]
    fn test_timeouts_are_transient() {
        let err = ResourceError::Timeout {
            kind: ResourceKind::Redis,
            operation: "get",
            timeout: Duration::from_secs(3),
        };
        assert!(err.is_transient());
        assert!(!err.is_disabled());
    }
}
