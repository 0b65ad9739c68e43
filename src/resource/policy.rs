//! Connection pool policies, fixed per resource kind.

use std::time::Duration;

use crate::resilience::retries::RetryPolicy;

/// Pool sizing, timeouts and retry behaviour for one resource kind.
///
/// Fields a driver cannot express are kept so the policy stays a complete
/// description of intent; see [`PoolPolicy::postgres`] and
/// [`PoolPolicy::redis`] for what each driver honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    /// Maximum open connections, idle or in use.
    pub max_open: u32,
    /// Maximum idle connections kept in the pool.
    pub max_idle: u32,
    /// Idle connections the pool tries to keep warm.
    pub min_idle: u32,
    /// Connections older than this are closed instead of reused.
    pub conn_max_lifetime: Option<Duration>,
    /// Connections idle longer than this are closed.
    pub conn_max_idle_time: Option<Duration>,
    /// Bound on establishing a connection or waiting for a free one.
    pub dial_timeout: Duration,
    /// Bound on a single read command; `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    /// Bound on a single write command; `None` waits indefinitely.
    pub write_timeout: Option<Duration>,
    /// Retries for transient command failures.
    pub retry: RetryPolicy,
    /// Bound on the startup liveness probe.
    pub probe_timeout: Duration,
}

impl PoolPolicy {
    /// PostgreSQL pool policy.
    ///
    /// sqlx honours `max_open`, `min_idle`, `conn_max_lifetime`,
    /// `conn_max_idle_time` and `dial_timeout` (as the acquire timeout).
    /// `max_idle` has no sqlx counterpart: idle connections are bounded by
    /// `max_open`.
    pub const fn postgres() -> Self {
        Self {
            max_open: 10,
            max_idle: 10,
            min_idle: 0,
            conn_max_lifetime: Some(Duration::from_secs(30 * 60)),
            conn_max_idle_time: None,
            dial_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: None,
            retry: RetryPolicy::NONE,
            probe_timeout: Duration::from_secs(5),
        }
    }

    /// Redis pool policy.
    ///
    /// deadpool honours `max_open` and `dial_timeout` (create and wait
    /// timeouts). Read/write timeouts and retries are enforced around every
    /// command by [`Cache`](super::Cache). Idle bounds and lifetimes are
    /// not expressible in deadpool; broken connections are detected on
    /// recycle instead.
    pub const fn redis() -> Self {
        Self {
            max_open: 10,
            max_idle: 5,
            min_idle: 1,
            conn_max_lifetime: Some(Duration::from_secs(30 * 60)),
            conn_max_idle_time: Some(Duration::from_secs(5 * 60)),
            dial_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(3)),
            write_timeout: Some(Duration::from_secs(3)),
            retry: RetryPolicy {
                max_retries: 3,
                min_backoff: Duration::from_millis(8),
                max_backoff: Duration::from_millis(512),
            },
            probe_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_constants() {
        let pg = PoolPolicy::postgres();
        assert_eq!(pg.max_open, 10);
        assert_eq!(pg.conn_max_lifetime, Some(Duration::from_secs(1800)));
        assert_eq!(pg.probe_timeout, Duration::from_secs(5));
        assert_eq!(pg.retry.max_retries, 0);

        let redis = PoolPolicy::redis();
        assert_eq!(redis.max_open, 10);
        assert_eq!(redis.min_idle, 1);
        assert_eq!(redis.max_idle, 5);
        assert_eq!(redis.probe_timeout, Duration::from_secs(2));
        assert_eq!(redis.retry.max_retries, 3);
        assert_eq!(redis.retry.min_backoff, Duration::from_millis(8));
        assert_eq!(redis.retry.max_backoff, Duration::from_millis(512));
    }
}
