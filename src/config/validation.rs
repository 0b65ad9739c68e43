//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject connection parameters that could never form a valid DSN
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Disabled resources are not validated beyond their enablement fields

use std::fmt;
use std::time::Duration;

use crate::config::schema::Config;

/// Cache URL schemes the Redis client understands over TCP.
pub const REDIS_SCHEMES: &[&str] = &["redis", "rediss", "valkey", "valkeys"];

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app.name.trim().is_empty() {
        errors.push(ValidationError::new("app.name", "must not be empty"));
    }
    if config.app.bind_address().is_err() {
        errors.push(ValidationError::new(
            "app.host",
            format!("'{}' is not a valid IP address", config.app.host),
        ));
    }
    if config.app.shutdown_timeout == Duration::ZERO {
        errors.push(ValidationError::new("app.shutdown_timeout", "must be greater than zero"));
    }
    if config.app.drain_timeout == Duration::ZERO {
        errors.push(ValidationError::new("app.drain_timeout", "must be greater than zero"));
    }
    // The drain runs inside the shutdown budget.
    if config.app.shutdown_timeout > Duration::ZERO
        && config.app.drain_timeout > config.app.shutdown_timeout
    {
        errors.push(ValidationError::new(
            "app.drain_timeout",
            format!(
                "{} exceeds app.shutdown_timeout ({})",
                humantime::format_duration(config.app.drain_timeout),
                humantime::format_duration(config.app.shutdown_timeout)
            ),
        ));
    }
    if config.app.max_connections == 0 {
        errors.push(ValidationError::new("app.max_connections", "must be greater than zero"));
    }

    if config.db.is_enabled() && config.db.port == 0 {
        errors.push(ValidationError::new("db.port", "must be non-zero when the database is enabled"));
    }

    if config.redis.is_enabled() {
        if config.redis.port == 0 {
            errors.push(ValidationError::new("redis.port", "must be non-zero when the cache is enabled"));
        }
        let scheme = config.redis.scheme.trim();
        if !scheme.is_empty() && !REDIS_SCHEMES.contains(&scheme) {
            errors.push(ValidationError::new(
                "redis.scheme",
                format!("unsupported scheme '{}' (expected one of {:?})", scheme, REDIS_SCHEMES),
            ));
        }
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.app.shutdown_timeout = Duration::ZERO;
        config.app.host = "not an ip".into();
        config.redis.host = "cache".into();
        config.redis.scheme = "http".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["app.host", "app.shutdown_timeout", "redis.scheme"]);
    }

    #[test]
    fn test_drain_must_fit_in_shutdown_timeout() {
        let mut config = Config::default();
        config.app.drain_timeout = Duration::from_secs(30);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "app.drain_timeout");
        assert_eq!(errors[0].message, "30s exceeds app.shutdown_timeout (10s)");

        // Equal timeouts are accepted; the listener clamps the drain itself.
        config.app.drain_timeout = config.app.shutdown_timeout;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_disabled_resources_skip_checks() {
        let mut config = Config::default();
        config.redis.scheme = "http".into();
        config.db.port = 0;
        assert!(validate_config(&config).is_ok());
    }
}
