//! Lifecycle hooks: a named pair of optional start and stop actions.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

/// Error type carried across hook boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) type HookFuture = BoxFuture<'static, Result<(), BoxError>>;
pub(crate) type StartFn = Box<dyn FnOnce(CancellationToken) -> HookFuture + Send>;
pub(crate) type StopFn = Box<dyn FnOnce() -> HookFuture + Send>;

pub(crate) struct StartAction {
    pub(crate) timeout: Duration,
    pub(crate) run: StartFn,
}

pub(crate) struct StopAction {
    pub(crate) timeout: Option<Duration>,
    pub(crate) run: StopFn,
}

/// A start/stop pair registered with the [`Lifecycle`](super::Lifecycle).
///
/// Both actions are optional. A hook without a start action counts as
/// started as soon as its turn comes; a hook without a stop action is
/// skipped during shutdown. Each action runs at most once.
pub struct Hook {
    name: String,
    pub(crate) start: Option<StartAction>,
    pub(crate) stop: Option<StopAction>,
}

impl Hook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            stop: None,
        }
    }

    /// Set the start action, bounded by `timeout`.
    ///
    /// The action receives a child of the coordinator's cancellation token,
    /// cancelled once the action returns. Work that must outlive the start
    /// (a serve loop) needs its own token.
    pub fn on_start<F, Fut, E>(mut self, timeout: Duration, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.start = Some(StartAction {
            timeout,
            run: Box::new(move |token| {
                let fut = f(token);
                async move { fut.await.map_err(Into::<BoxError>::into) }.boxed()
            }),
        });
        self
    }

    /// Set the stop action.
    pub fn on_stop<F, Fut, E>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let timeout = self.stop.as_ref().and_then(|s| s.timeout);
        self.stop = Some(StopAction {
            timeout,
            run: Box::new(move || {
                let fut = f();
                async move { fut.await.map_err(Into::<BoxError>::into) }.boxed()
            }),
        });
        self
    }

    /// Bound the stop action by its own timeout, in addition to the
    /// coordinator's overall shutdown budget.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        if let Some(stop) = self.stop.as_mut() {
            stop.timeout = Some(timeout);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_start(&self) -> bool {
        self.start.is_some()
    }

    pub fn has_stop(&self) -> bool {
        self.stop.is_some()
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start.as_ref().map(|s| s.timeout)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("start_timeout", &self.start_timeout())
            .field("has_stop", &self.has_stop())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_actions() {
        let hook = Hook::new("db")
            .on_start(Duration::from_secs(5), |_| async { Ok::<_, std::io::Error>(()) })
            .on_stop(|| async { Ok::<_, std::io::Error>(()) })
            .with_stop_timeout(Duration::from_secs(1));

        assert_eq!(hook.name(), "db");
        assert!(hook.has_start());
        assert!(hook.has_stop());
        assert_eq!(hook.start_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(hook.stop.as_ref().and_then(|s| s.timeout), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_stop_only_hook() {
        let hook = Hook::new("cache").on_stop(|| async { Ok::<_, std::io::Error>(()) });
        assert!(!hook.has_start());
        assert!(hook.has_stop());
        assert_eq!(hook.start_timeout(), None);
    }
}
