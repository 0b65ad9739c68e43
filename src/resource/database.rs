//! PostgreSQL provisioning.
//!
//! # Responsibilities
//! - Build the DSN from configuration and environment
//! - Construct a lazily-connecting sqlx pool with the Postgres pool policy
//! - Register the liveness probe and close hooks
//! - Expose execute/query/query-one/prepare/rebind over live or disabled pools

use std::fmt::Write as _;
use std::str::FromStr;

use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgStatement};
use sqlx::query::Query;
use sqlx::{Connection, Executor, Postgres};

use crate::config::{DbConfig, Environment};
use crate::lifecycle::{Hook, Lifecycle};
use crate::observability::metrics;
use crate::resource::{redact_url, PoolPolicy, ResourceError, ResourceKind};

const KIND: ResourceKind = ResourceKind::Postgres;

/// Query parameters appended for pooled, TLS-only deployments.
pub const DEPLOYED_PARAMS: &str =
    "?sslmode=require&pool_mode=transaction&default_query_exec_mode=simple_protocol";

/// Build the PostgreSQL connection string.
///
/// The credential segment is kept verbatim even when user and password are
/// both empty (`postgres://:@host:port/name`).
pub fn postgres_dsn(config: &DbConfig, env: Environment) -> String {
    let mut dsn = format!(
        "postgres://{}:{}@{}:{}/{}",
        config.user, config.password, config.host, config.port, config.name
    );
    if env.is_deployed() {
        dsn.push_str(DEPLOYED_PARAMS);
    }
    dsn
}

/// Rewrite `?` placeholders into PostgreSQL's `$1, $2, ...` form.
///
/// Question marks inside single-quoted literals are left alone.
pub fn rebind(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0u32;
    let mut in_literal = false;

    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => {
                n += 1;
                let _ = write!(out, "${}", n);
            }
            _ => out.push(c),
        }
    }
    out
}

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Int(v.into())
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<Vec<u8>> for SqlParam {
    fn from(v: Vec<u8>) -> Self {
        SqlParam::Bytes(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlParam::Null, Into::into)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// PostgreSQL handle: a live pool, or a placeholder when unconfigured.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Debug, Clone)]
pub enum Database {
    Live(PgPool),
    Disabled,
}

impl Database {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Database::Live(_))
    }

    fn live(&self, operation: &'static str) -> Result<&PgPool, ResourceError> {
        match self {
            Database::Live(pool) => Ok(pool),
            Database::Disabled => {
                metrics::record_disabled_call(KIND.as_str(), operation);
                Err(ResourceError::Disabled(KIND))
            }
        }
    }

    /// The underlying pool, for callers that need sqlx directly.
    pub fn pool(&self) -> Result<&PgPool, ResourceError> {
        self.live("pool")
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64, ResourceError> {
        let pool = self.live("execute")?;
        let result = bind_params(sqlx::query::<Postgres>(sql), params)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Run a query and collect every row.
    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<PgRow>, ResourceError> {
        let pool = self.live("query")?;
        let rows = bind_params(sqlx::query::<Postgres>(sql), params)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Run a query expected to return exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<PgRow, ResourceError> {
        let pool = self.live("query_one")?;
        let row = bind_params(sqlx::query::<Postgres>(sql), params)
            .fetch_one(pool)
            .await?;
        Ok(row)
    }

    /// Prepare a statement on one pooled connection.
    pub async fn prepare<'q>(&self, sql: &'q str) -> Result<PgStatement<'q>, ResourceError> {
        let pool = self.live("prepare")?;
        let statement = pool.prepare(sql).await?;
        Ok(statement)
    }

    /// See [`rebind`]. Pure text rewriting; works for disabled handles too.
    pub fn rebind(&self, sql: &str) -> String {
        rebind(sql)
    }

    /// Acquire a connection and round-trip a ping.
    pub async fn ping(&self) -> Result<(), ResourceError> {
        let pool = self.live("ping")?;
        let mut conn = pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }
}

/// Provision the database and register its lifecycle hooks.
///
/// A disabled configuration yields [`Database::Disabled`] with a no-op stop
/// hook. An enabled one builds the pool without connecting; the registered
/// start hook performs the first connection as a bounded liveness probe.
/// Must be called from within a Tokio runtime.
pub fn provision(
    config: &DbConfig,
    env: Environment,
    policy: &PoolPolicy,
    lifecycle: &mut Lifecycle,
) -> Result<Database, ResourceError> {
    let register = |lifecycle: &mut Lifecycle, hook: Hook| {
        lifecycle
            .register(hook)
            .map_err(|source| ResourceError::Registration { kind: KIND, source })
    };

    if !config.is_enabled() {
        tracing::info!("postgres_disabled");
        metrics::record_resource_enabled(KIND.as_str(), false);
        register(
            lifecycle,
            Hook::new(KIND.as_str()).on_stop(|| async { Ok::<(), ResourceError>(()) }),
        )?;
        return Ok(Database::Disabled);
    }

    let dsn = postgres_dsn(config, env);
    let mut options = PgConnectOptions::from_str(&dsn).map_err(|e| ResourceError::Configuration {
        kind: KIND,
        reason: e.to_string(),
    })?;
    if env.is_deployed() {
        // Transaction-mode poolers cannot hold server-side prepared statements.
        options = options.statement_cache_capacity(0);
    }

    let pool = PgPoolOptions::new()
        .max_connections(policy.max_open)
        .min_connections(policy.min_idle)
        .max_lifetime(policy.conn_max_lifetime)
        .idle_timeout(policy.conn_max_idle_time)
        .acquire_timeout(policy.dial_timeout)
        .connect_lazy_with(options);

    let database = Database::Live(pool.clone());
    let probe = database.clone();
    let hook = Hook::new(KIND.as_str())
        .on_start(policy.probe_timeout, move |_ctx| async move {
            probe.ping().await.map_err(|e| ResourceError::Liveness {
                kind: KIND,
                source: Box::new(e),
            })
        })
        .on_stop(move || async move {
            pool.close().await;
            tracing::info!("postgres_closed");
            Ok::<(), ResourceError>(())
        });
    register(lifecycle, hook)?;

    metrics::record_resource_enabled(KIND.as_str(), true);
    tracing::info!(
        dsn = %redact_url(&dsn),
        host = %config.host,
        port = config.port,
        user = %config.user,
        max_open = policy.max_open,
        "postgres_enabled"
    );

    Ok(database)
}
