//! HTTP listener with backpressure and graceful drain.
//!
//! # Responsibilities
//! - Bind to the configured address (fatal on failure)
//! - Accept incoming TCP connections under a connection limit
//! - Serve each connection with hyper over the axum router
//! - Drain in-flight requests on stop, bounded by the drain timeout

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::config::AppConfig;
use crate::lifecycle::{Hook, Lifecycle, LifecycleError};
use crate::net::connection::ConnectionTracker;

/// Bound on binding the socket during startup.
pub const BIND_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound on the shutdown budget held back from the drain for the
/// stop hooks that run after the listener.
const CLOSE_RESERVE_CAP: Duration = Duration::from_secs(2);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limit was closed; the listener is shutting down.
    Closed,
    /// In-flight connections did not finish within the drain timeout.
    DrainTimeout(Duration),
    /// The serve task panicked or was cancelled.
    Task(tokio::task::JoinError),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Listener closed"),
            ListenerError::DrainTimeout(t) => {
                write!(f, "Connections still in flight after {:?} drain", t)
            }
            ListenerError::Task(e) => write!(f, "Serve task failed: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::Task(e) => Some(e),
            _ => None,
        }
    }
}

/// Listener parameters derived from the application config.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Address to bind; port 0 picks an ephemeral port.
    pub address: SocketAddr,
    /// Concurrent connections served before accepting blocks.
    pub max_connections: usize,
    /// How long stop waits for in-flight connections before aborting them.
    pub drain_timeout: Duration,
}

impl ListenerSettings {
    /// Derive settings from the app section.
    ///
    /// The drain is clamped by [`drain_budget`] so it cannot consume the
    /// whole shutdown timeout.
    pub fn from_config(app: &AppConfig) -> Result<Self, ListenerError> {
        let address = app.bind_address().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let drain_timeout = drain_budget(app.drain_timeout, app.shutdown_timeout);
        if drain_timeout < app.drain_timeout {
            tracing::warn!(
                configured_ms = app.drain_timeout.as_millis() as u64,
                effective_ms = drain_timeout.as_millis() as u64,
                shutdown_timeout_ms = app.shutdown_timeout.as_millis() as u64,
                "Drain timeout clamped to leave room for resource shutdown"
            );
        }
        Ok(Self {
            address,
            max_connections: app.max_connections,
            drain_timeout,
        })
    }
}

/// Effective drain timeout within a shared shutdown budget.
///
/// Holds back a fifth of `shutdown`, capped at two seconds, for the stop
/// hooks that run after the listener.
pub fn drain_budget(drain: Duration, shutdown: Duration) -> Duration {
    let reserve = (shutdown / 5).min(CLOSE_RESERVE_CAP);
    drain.min(shutdown.saturating_sub(reserve))
}

/// A bounded TCP listener that limits concurrent connections.
///
/// When the limit is reached, accepting waits until a slot is released.
pub struct Listener {
    /// The bound socket.
    inner: TcpListener,
    /// One permit per live connection; accept waits when none are left.
    connection_limit: Arc<Semaphore>,
    /// Permit count the semaphore was created with.
    max_connections: usize,
}

impl Listener {
    pub async fn bind(address: SocketAddr, max_connections: usize) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(address).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Permit first: backpressure before the kernel hands us a socket.
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection slot; released back to the listener on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    /// Held for the connection's lifetime.
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Observes a registered listener from outside the lifecycle.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    /// Set once by the start hook after binding.
    local_addr: Arc<OnceLock<SocketAddr>>,
    /// Shared with the serve loop, which tracks each accepted connection.
    tracker: ConnectionTracker,
}

impl ListenerHandle {
    /// The bound address, once the start hook has run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

/// The spawned serve loop; aborted when dropped.
///
/// The coordinator may drop an unfinished stop future when the shutdown
/// budget runs out, and the serve loop must not outlive it.
struct ServeTask(JoinHandle<()>);

impl Drop for ServeTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Register the listener's start and stop hooks.
///
/// Start binds and spawns the serve loop, returning as soon as the socket
/// is bound. Stop closes the socket, then waits up to the drain timeout for
/// in-flight connections before aborting them.
pub fn register(
    lifecycle: &mut Lifecycle,
    settings: ListenerSettings,
    router: Router,
) -> Result<ListenerHandle, LifecycleError> {
    let handle = ListenerHandle {
        local_addr: Arc::new(OnceLock::new()),
        tracker: ConnectionTracker::new(),
    };
    let task: Arc<Mutex<Option<ServeTask>>> = Arc::new(Mutex::new(None));
    let shutdown = CancellationToken::new();

    let start = {
        let handle = handle.clone();
        let task = Arc::clone(&task);
        let shutdown = shutdown.clone();
        let settings = settings.clone();
        move |_ctx: CancellationToken| async move {
            let listener = Listener::bind(settings.address, settings.max_connections).await?;
            let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
            let _ = handle.local_addr.set(local_addr);

            let serve_loop = serve(listener, router, handle.tracker.clone(), shutdown);
            *task.lock().await = Some(ServeTask(tokio::spawn(serve_loop)));
            tracing::info!(address = %local_addr, "HTTP server started");
            Ok::<(), ListenerError>(())
        }
    };

    let drain_timeout = settings.drain_timeout;
    let tracker = handle.tracker.clone();
    let stop = move || async move {
        shutdown.cancel();
        let Some(mut serving) = task.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(drain_timeout, &mut serving.0).await {
            Ok(Ok(())) => {
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ListenerError::Task(e)),
            Err(_) => {
                tracing::warn!(
                    remaining = tracker.active_count(),
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "Drain timed out, aborting in-flight connections"
                );
                serving.0.abort();
                // The task was just aborted; its cancellation error is expected.
                let _ = (&mut serving.0).await;
                Err(ListenerError::DrainTimeout(drain_timeout))
            }
        }
    };

    lifecycle.register(Hook::new("http").on_start(BIND_TIMEOUT, start).on_stop(stop))?;
    Ok(handle)
}

/// Accept and serve connections until `shutdown` fires, then drain.
///
/// Accept errors are logged and never end the loop. Aborting this task
/// drops every connection task with it.
async fn serve(
    listener: Listener,
    router: Router,
    tracker: ConnectionTracker,
    shutdown: CancellationToken,
) {
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = listener.accept() => res,
        };

        let (stream, peer_addr, permit) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        let guard = tracker.track();
        let router = router.clone();
        let service = hyper::service::service_fn(move |req: Request<Incoming>| {
            let mut router = router.clone();
            async move { router.call(req).await }
        });
        let conn = builder
            .serve_connection_with_upgrades(TokioIo::new(stream), service)
            .into_owned();
        let conn = graceful.watch(conn);

        connections.spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(
                    peer_addr = %peer_addr,
                    connection_id = %guard.id(),
                    error = %e,
                    "Connection ended with error"
                );
            }
            drop(permit);
            drop(guard);
        });

        // Reap finished connection tasks.
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    tracing::info!(
        active_connections = tracker.active_count(),
        "Listener closed, draining connections"
    );

    graceful.shutdown().await;
    while connections.join_next().await.is_some() {}
    tracing::info!("Drain complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_respects_limit() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), 2).await.unwrap();
        assert_eq!(listener.max_connections(), 2);
        assert_eq!(listener.available_permits(), 2);

        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _peer, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[test]
    fn test_settings_reject_bad_host() {
        let app = AppConfig {
            host: "not an address".into(),
            ..AppConfig::default()
        };
        assert!(matches!(
            ListenerSettings::from_config(&app),
            Err(ListenerError::Bind(_))
        ));
    }

    #[test]
    fn test_default_drain_leaves_shutdown_reserve() {
        let app = AppConfig {
            host: "127.0.0.1".into(),
            ..AppConfig::default()
        };
        assert_eq!(app.drain_timeout, app.shutdown_timeout);

        let settings = ListenerSettings::from_config(&app).unwrap();
        assert_eq!(settings.drain_timeout, Duration::from_secs(8));
        assert!(settings.drain_timeout < app.shutdown_timeout);
    }

    #[test]
    fn test_drain_budget() {
        let ms = Duration::from_millis;
        // A fifth of the budget is held back for short timeouts.
        assert_eq!(drain_budget(ms(300), ms(300)), ms(240));
        // The reserve is capped for long ones.
        assert_eq!(
            drain_budget(Duration::from_secs(60), Duration::from_secs(60)),
            Duration::from_secs(58)
        );
        // A drain that already fits is left alone.
        assert_eq!(drain_budget(Duration::from_secs(2), Duration::from_secs(5)), Duration::from_secs(2));
        assert_eq!(drain_budget(ms(500), Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_dropping_serve_task_aborts_it() {
        let handle = tokio::spawn(std::future::pending::<()>());
        let abort = handle.abort_handle();
        drop(ServeTask(handle));
        tokio::time::timeout(Duration::from_secs(1), async {
            while !abort.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_drain_timeout_display() {
        let err = ListenerError::DrainTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Connections still in flight after 10s drain");
    }
}
