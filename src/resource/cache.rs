//! Redis provisioning.
//!
//! # Responsibilities
//! - Build the Redis URL from configuration
//! - Construct a deadpool pool with the Redis pool policy (no I/O)
//! - Register the PING probe and close hooks
//! - Wrap every command in its read/write timeout and the retry policy

use std::fmt;
use std::future::Future;
use std::time::Duration;

use deadpool_redis::redis::{self, AsyncCommands, RedisError};
use deadpool_redis::{Config, Connection, Pool, Runtime};

use crate::config::RedisConfig;
use crate::lifecycle::{Hook, Lifecycle};
use crate::observability::metrics;
use crate::resilience::retries::{with_retries, RetryPolicy};
use crate::resource::{redact_url, PoolPolicy, ResourceError, ResourceKind};

const KIND: ResourceKind = ResourceKind::Redis;

/// Build the Redis connection URL.
///
/// The scheme defaults to `redis`. The credential segment is omitted when
/// user and password are both blank.
pub fn redis_url(config: &RedisConfig) -> String {
    let scheme = match config.scheme.trim() {
        "" => "redis",
        s => s,
    };
    if config.user.trim().is_empty() && config.password.trim().is_empty() {
        format!("{}://{}:{}", scheme, config.host, config.port)
    } else {
        format!(
            "{}://{}:{}@{}:{}",
            scheme, config.user, config.password, config.host, config.port
        )
    }
}

/// A live Redis pool with its command policy.
#[derive(Clone)]
pub struct LiveCache {
    pool: Pool,
    policy: PoolPolicy,
}

impl LiveCache {
    /// Run one command under `timeout`, retried per the pool policy.
    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Option<Duration>,
        retry: RetryPolicy,
        f: F,
    ) -> Result<T, ResourceError>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let pool = &self.pool;
        let f = &f;
        with_retries(retry, operation, ResourceError::is_transient, || async move {
            let attempt = async {
                let conn = pool.get().await?;
                Ok::<T, ResourceError>(f(conn).await?)
            };
            match timeout {
                Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
                    ResourceError::Timeout {
                        kind: KIND,
                        operation,
                        timeout: limit,
                    }
                })?,
                None => attempt.await,
            }
        })
        .await
    }

    async fn ping(&self, retry: RetryPolicy) -> Result<(), ResourceError> {
        let reply = self
            .call("ping", self.policy.read_timeout, retry, |mut conn: Connection| async move {
                redis::cmd("PING").query_async::<String>(&mut *conn).await
            })
            .await?;
        tracing::debug!(reply = %reply, "redis_ping");
        Ok(())
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl fmt::Debug for LiveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCache")
            .field("status", &self.pool.status())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Redis handle: a live pool, or a placeholder when unconfigured.
#[derive(Debug, Clone)]
pub enum Cache {
    Live(LiveCache),
    Disabled,
}

impl Cache {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Cache::Live(_))
    }

    fn live(&self, operation: &'static str) -> Result<&LiveCache, ResourceError> {
        match self {
            Cache::Live(live) => Ok(live),
            Cache::Disabled => {
                metrics::record_disabled_call(KIND.as_str(), operation);
                Err(ResourceError::Disabled(KIND))
            }
        }
    }

    /// Fetch a string value; `None` when the key does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<String>, ResourceError> {
        let live = self.live("get")?;
        live.call("get", live.policy.read_timeout, live.policy.retry, |mut conn: Connection| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    /// Store a string value. A zero or absent `ttl` stores without expiry.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ResourceError> {
        let live = self.live("set")?;
        let ttl_secs = ttl.map(|t| t.as_secs()).filter(|s| *s > 0);
        live.call("set", live.policy.write_timeout, live.policy.retry, |mut conn: Connection| async move {
            match ttl_secs {
                Some(secs) => conn.set_ex::<_, _, ()>(key, value, secs).await,
                None => conn.set::<_, _, ()>(key, value).await,
            }
        })
        .await
    }

    /// Delete a key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, ResourceError> {
        let live = self.live("delete")?;
        let removed = live
            .call("delete", live.policy.write_timeout, live.policy.retry, |mut conn: Connection| async move {
                conn.del::<_, i64>(key).await
            })
            .await?;
        Ok(removed > 0)
    }

    /// Round-trip a PING, retried like any other command.
    pub async fn ping(&self) -> Result<(), ResourceError> {
        let live = self.live("ping")?;
        live.ping(live.policy.retry).await
    }

    /// The underlying pool, for callers that need raw commands.
    pub fn pool(&self) -> Result<&Pool, ResourceError> {
        self.live("pool").map(LiveCache::pool)
    }
}

/// Provision the cache and register its lifecycle hooks.
///
/// A disabled configuration yields [`Cache::Disabled`] with a no-op stop
/// hook. An enabled one builds the pool without connecting; the registered
/// start hook sends a single PING bounded by the probe timeout.
pub fn provision(
    config: &RedisConfig,
    policy: &PoolPolicy,
    lifecycle: &mut Lifecycle,
) -> Result<Cache, ResourceError> {
    let register = |lifecycle: &mut Lifecycle, hook: Hook| {
        lifecycle
            .register(hook)
            .map_err(|source| ResourceError::Registration { kind: KIND, source })
    };

    if !config.is_enabled() {
        tracing::info!("redis_disabled");
        metrics::record_resource_enabled(KIND.as_str(), false);
        register(
            lifecycle,
            Hook::new(KIND.as_str()).on_stop(|| async { Ok::<(), ResourceError>(()) }),
        )?;
        return Ok(Cache::Disabled);
    }

    let url = redis_url(config);
    let configuration = |e: &dyn fmt::Display| ResourceError::Configuration {
        kind: KIND,
        reason: e.to_string(),
    };
    let pool = Config::from_url(url.clone())
        .builder()
        .map_err(|e| configuration(&e))?
        .max_size(policy.max_open as usize)
        .create_timeout(Some(policy.dial_timeout))
        .wait_timeout(Some(policy.dial_timeout))
        .recycle_timeout(policy.read_timeout)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| configuration(&e))?;

    let live = LiveCache {
        pool,
        policy: *policy,
    };
    let probe = live.clone();
    let closing = live.pool.clone();
    let hook = Hook::new(KIND.as_str())
        .on_start(policy.probe_timeout, move |_ctx| async move {
            probe
                .ping(RetryPolicy::NONE)
                .await
                .map_err(|e| ResourceError::Liveness {
                    kind: KIND,
                    source: Box::new(e),
                })
        })
        .on_stop(move || async move {
            closing.close();
            tracing::info!("redis_closed");
            Ok::<(), ResourceError>(())
        });
    register(lifecycle, hook)?;

    metrics::record_resource_enabled(KIND.as_str(), true);
    tracing::info!(
        url = %redact_url(&url),
        host = %config.host,
        port = config.port,
        user = %config.user,
        "redis_cache_initialized"
    );

    Ok(Cache::Live(live))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis(host: &str) -> RedisConfig {
        RedisConfig {
            host: host.into(),
            ..RedisConfig::default()
        }
    }

    #[test]
    fn test_url_without_credentials() {
        assert_eq!(redis_url(&redis("cache")), "redis://cache:6379");

        let blank = RedisConfig {
            user: "  ".into(),
            password: " ".into(),
            ..redis("cache")
        };
        assert_eq!(redis_url(&blank), "redis://cache:6379");
    }

    #[test]
    fn test_url_with_credentials_and_scheme() {
        let config = RedisConfig {
            scheme: "rediss".into(),
            user: "svc".into(),
            password: "pw".into(),
            port: 6380,
            ..redis("cache")
        };
        assert_eq!(redis_url(&config), "rediss://svc:pw@cache:6380");

        let password_only = RedisConfig {
            password: "pw".into(),
            ..redis("cache")
        };
        assert_eq!(redis_url(&password_only), "redis://:pw@cache:6379");
    }

    #[tokio::test]
    async fn test_disabled_operations_fail_with_sentinel() {
        let cache = Cache::Disabled;
        assert!(!cache.is_enabled());

        let err = cache.get("k").await.unwrap_err();
        assert_eq!(err.to_string(), "redis disabled: set REDIS_* env vars to enable");
        assert!(cache.set("k", "v", None).await.unwrap_err().is_disabled());
        assert!(cache.delete("k").await.unwrap_err().is_disabled());
        assert!(cache.ping().await.unwrap_err().is_disabled());
        assert!(cache.pool().unwrap_err().is_disabled());
    }

    #[tokio::test]
    async fn test_provision_disabled_registers_stop_only() {
        let mut lifecycle = Lifecycle::default();
        let cache = provision(&redis(""), &PoolPolicy::redis(), &mut lifecycle).unwrap();

        assert!(matches!(cache, Cache::Disabled));
        assert_eq!(lifecycle.hook_names(), vec!["redis"]);
    }

    #[tokio::test]
    async fn test_provision_malformed_host_registers_nothing() {
        let mut lifecycle = Lifecycle::default();
        let err = provision(&redis("bad host"), &PoolPolicy::redis(), &mut lifecycle).unwrap_err();

        assert!(matches!(err, ResourceError::Configuration { kind: ResourceKind::Redis, .. }));
        assert!(lifecycle.is_empty());
    }

    #[tokio::test]
    async fn test_provision_enabled_is_lazy() {
        let mut lifecycle = Lifecycle::default();
        let config = RedisConfig {
            port: 1,
            ..redis("127.0.0.1")
        };
        let cache = provision(&config, &PoolPolicy::redis(), &mut lifecycle).unwrap();

        assert!(cache.is_enabled());
        assert_eq!(lifecycle.len(), 1);
    }
}
