//! Environment variable overlay.
//!
//! Keys are matched case-insensitively; `.` and `-` are treated as `_`, so
//! `db.host`, `DB-HOST` and `DB_HOST` all address the same setting. Unknown
//! keys are ignored since the process environment carries plenty of them.

use std::time::Duration;

use crate::config::loader::ConfigError;
use crate::config::schema::{Config, Environment};

/// Normalize a key to its canonical `UPPER_SNAKE` form.
fn normalize(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Apply `(key, value)` pairs on top of `config`.
pub fn apply_env<I, K, V>(config: &mut Config, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    for (key, value) in vars {
        let key = normalize(key.as_ref());
        let value: String = value.into();

        match key.as_str() {
            "APP_NAME" => config.app.name = value,
            "APP_ENV" => {
                config.app.env = value
                    .parse::<Environment>()
                    .map_err(|reason| ConfigError::Env { key, reason })?;
            }
            "APP_HOST" => config.app.host = value,
            "APP_PORT" => config.app.port = parse_port(&key, &value)?,
            "LOG_LEVEL" => config.app.log_level = value,
            "APP_SHUTDOWN_TIMEOUT" => config.app.shutdown_timeout = parse_duration(&key, &value)?,
            "APP_DRAIN_TIMEOUT" => config.app.drain_timeout = parse_duration(&key, &value)?,

            "DB_USER" => config.db.user = value,
            "DB_PASSWORD" => config.db.password = value,
            "DB_HOST" => config.db.host = value,
            "DB_PORT" => config.db.port = parse_port(&key, &value)?,
            "DB_NAME" => config.db.name = value,

            "REDIS_SCHEME" => config.redis.scheme = value,
            "REDIS_HOST" => config.redis.host = value,
            "REDIS_PORT" => config.redis.port = parse_port(&key, &value)?,
            "REDIS_USER" => config.redis.user = value,
            "REDIS_PASSWORD" => config.redis.password = value,

            "METRICS_ENABLED" => {
                config.observability.metrics_enabled = parse_bool(&key, &value)?;
            }
            "METRICS_ADDRESS" => config.observability.metrics_address = value,
            _ => {}
        }
    }

    Ok(())
}

/// Apply the current process environment.
pub fn apply_process_env(config: &mut Config) -> Result<(), ConfigError> {
    apply_env(config, std::env::vars())
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|e| ConfigError::Env {
        key: key.to_string(),
        reason: format!("invalid port '{}': {}", value, e),
    })
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::Env {
        key: key.to_string(),
        reason: format!("invalid duration '{}': {}", value, e),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env {
            key: key.to_string(),
            reason: format!("invalid boolean '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut config = Config::default();
        apply_env(
            &mut config,
            [
                ("db_host", "pg.internal"),
                ("Db.Name", "orders"),
                ("DB-USER", "svc"),
                ("redis_host", "cache"),
                ("app_env", "PRODUCTION"),
            ],
        )
        .unwrap();

        assert_eq!(config.db.host, "pg.internal");
        assert_eq!(config.db.name, "orders");
        assert_eq!(config.db.user, "svc");
        assert_eq!(config.redis.host, "cache");
        assert_eq!(config.app.env, Environment::Production);
        assert!(config.db.is_enabled());
        assert!(config.redis.is_enabled());
    }

    #[test]
    fn test_shutdown_timeout_duration() {
        let mut config = Config::default();
        apply_env(&mut config, [("APP_SHUTDOWN_TIMEOUT", "2500ms")]).unwrap();
        assert_eq!(config.app.shutdown_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let mut config = Config::default();

        let err = apply_env(&mut config, [("APP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "APP_PORT"));

        let err = apply_env(&mut config, [("APP_SHUTDOWN_TIMEOUT", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "APP_SHUTDOWN_TIMEOUT"));

        let err = apply_env(&mut config, [("APP_ENV", "staging")]).unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut config = Config::default();
        apply_env(&mut config, [("PATH", "/usr/bin"), ("HOME", "/root")]).unwrap();
        assert_eq!(config.app.port, 8080);
    }
}
