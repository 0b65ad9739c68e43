//! Composition root.
//!
//! # Responsibilities
//! - Construct components in dependency order:
//!   config → database → cache → router → listener
//! - Own the lifecycle coordinator and drive start/stop
//! - Wait for a termination signal between the two
//!
//! # Design Decisions
//! - Explicit construction; every dependency is passed by value or `Arc`
//! - Registration order is construction order, so teardown is its reverse
//! - A failed startup still releases whatever did start before returning

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::http::{build_router, AppState};
use crate::lifecycle::{shutdown_signal, Lifecycle, LifecycleError, Phase};
use crate::net::{self, ListenerError, ListenerHandle, ListenerSettings};
use crate::resource::{cache, database, Cache, Database, PoolPolicy, ResourceError};

/// Errors surfaced by [`App`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl AppError {
    /// Process exit code: 2 for invalid configuration, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Resource(ResourceError::Configuration { .. }) => 2,
            AppError::Listener(ListenerError::Bind(e))
                if e.kind() == std::io::ErrorKind::InvalidInput =>
            {
                2
            }
            _ => 1,
        }
    }
}

/// Pool policies used when provisioning resources.
#[derive(Debug, Clone, Copy)]
pub struct Policies {
    pub database: PoolPolicy,
    pub cache: PoolPolicy,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            database: PoolPolicy::postgres(),
            cache: PoolPolicy::redis(),
        }
    }
}

/// A fully wired service, ready to start.
pub struct App {
    config: Arc<Config>,
    lifecycle: Lifecycle,
    listener: ListenerHandle,
    db: Database,
    cache: Cache,
}

impl App {
    /// Wire the service with the default pool policies.
    ///
    /// `routes` are merged next to the built-in `/health` route. Must be
    /// called from within a Tokio runtime.
    pub fn build(config: Config, routes: Router<AppState>) -> Result<Self, AppError> {
        Self::build_with(config, routes, Policies::default())
    }

    pub fn build_with(
        config: Config,
        routes: Router<AppState>,
        policies: Policies,
    ) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let mut lifecycle = Lifecycle::new(config.app.shutdown_timeout);

        let db = database::provision(
            &config.db,
            config.app.env,
            &policies.database,
            &mut lifecycle,
        )?;
        let cache = cache::provision(&config.redis, &policies.cache, &mut lifecycle)?;

        let state = AppState {
            config: Arc::clone(&config),
            db: db.clone(),
            cache: cache.clone(),
        };
        let router = build_router(state, routes);

        let settings = ListenerSettings::from_config(&config.app)?;
        let listener = net::register(&mut lifecycle, settings, router)?;

        tracing::info!(
            service = %config.app.name,
            env = %config.app.env,
            hooks = ?lifecycle.hook_names(),
            "Application wired"
        );

        Ok(Self {
            config,
            lifecycle,
            listener,
            db,
            cache,
        })
    }

    /// Run every start hook. On failure the coordinator is left `Failed`;
    /// call [`stop`](Self::stop) to release what did start.
    pub async fn start(&mut self) -> Result<(), AppError> {
        let ctx = CancellationToken::new();
        self.lifecycle.run_starts(&ctx).await?;
        Ok(())
    }

    /// Run every stop hook in reverse order under the shutdown budget.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        let ctx = CancellationToken::new();
        self.lifecycle.run_stops(&ctx).await?;
        Ok(())
    }

    /// Start, wait for SIGINT/SIGTERM, then stop.
    pub async fn run(mut self) -> Result<(), AppError> {
        if let Err(e) = self.start().await {
            tracing::error!(error = %e, "Startup failed, releasing started resources");
            if let Err(stop_err) = self.stop().await {
                tracing::warn!(error = %stop_err, "Cleanup after failed startup was incomplete");
            }
            return Err(e);
        }

        tracing::info!(
            service = %self.config.app.name,
            address = ?self.local_addr(),
            "Service ready"
        );

        shutdown_signal().await;
        self.stop().await?;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// The listener's bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn listener(&self) -> &ListenerHandle {
        &self.listener
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_registers_in_dependency_order() {
        let mut config = Config::default();
        config.app.host = "127.0.0.1".into();
        config.app.port = 0;

        let app = App::build(config, Router::new()).unwrap();
        assert_eq!(app.lifecycle.hook_names(), vec!["postgres", "redis", "http"]);
        assert_eq!(app.phase(), Phase::NotStarted);
        assert!(app.local_addr().is_none());
        assert!(!app.database().is_enabled());
        assert!(!app.cache().is_enabled());
    }

    #[tokio::test]
    async fn test_malformed_resource_exits_with_config_code() {
        let mut config = Config::default();
        config.redis.host = "bad host".into();

        let err = App::build(config, Router::new()).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
