//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a failed operation a bounded number of times
//! - Sleep with exponential backoff + jitter between attempts
//! - Leave the decision of what is retryable to the caller
//!
//! # Design Decisions
//! - `max_retries` counts retries, not attempts (0 = run once)
//! - Non-retryable errors return immediately

use std::future::Future;
use std::time::Duration;

use crate::resilience::backoff::calculate_backoff;

/// Retry parameters for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Run the operation exactly once.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        min_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
    };
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent. The last error is returned.
pub async fn with_retries<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && is_retryable(&e) => {
                attempt += 1;
                let delay = calculate_backoff(attempt, policy.min_backoff, policy.max_backoff);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries(policy(3), "get", |_| true, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err("transient".to_string()) } else { Ok(n) }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retries(policy(2), "set", |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retries(policy(5), "get", |_| false, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("fatal".to_string())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
