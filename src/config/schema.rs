//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Process-level settings (name, environment, listener, shutdown).
    pub app: AppConfig,

    /// PostgreSQL connection parameters. Disabled when host or name is empty.
    pub db: DbConfig,

    /// Redis connection parameters. Disabled when host is empty.
    pub redis: RedisConfig,

    /// HTTP layer settings.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Deployment environment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Preview,
    Production,
}

impl Environment {
    /// Production and preview deployments talk to pooled, TLS-only databases.
    pub fn is_deployed(&self) -> bool {
        matches!(self, Environment::Production | Environment::Preview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Preview => "preview",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "preview" => Ok(Environment::Preview),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "unknown environment '{}' (expected development, preview or production)",
                other
            )),
        }
    }
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Service name, used in logs.
    pub name: String,

    /// Deployment environment.
    pub env: Environment,

    /// Listener host.
    pub host: String,

    /// Listener port.
    pub port: u16,

    /// Log level (trace, debug, info, warn, error) or an `EnvFilter` directive.
    pub log_level: String,

    /// Overall budget shared by all stop hooks.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Budget for the listener to drain in-flight requests.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl AppConfig {
    /// Socket address the listener binds to.
    pub fn bind_address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port).parse()
        } else {
            format!("{}:{}", host, self.port).parse()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "service-bootstrap".to_string(),
            env: Environment::Development,
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            shutdown_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(10),
            max_connections: 10_000,
        }
    }
}

/// PostgreSQL configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DbConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
}

impl DbConfig {
    /// Enabled only when both the host and the database name are set.
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty() && !self.name.trim().is_empty()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 5432,
            name: String::new(),
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .finish()
    }
}

/// Redis configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// URL scheme (`redis` or `rediss`). Empty means `redis`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl RedisConfig {
    /// Enabled only when the host is set.
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            scheme: String::new(),
            host: String::new(),
            port: 6379,
            user: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

/// HTTP layer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
