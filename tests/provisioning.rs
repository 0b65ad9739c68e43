//! Resource provisioning against disabled, unreachable and silent backends.

use std::time::Duration;

use service_bootstrap::config::{DbConfig, Environment, RedisConfig};
use service_bootstrap::lifecycle::{HookError, Lifecycle, LifecycleError, Phase};
use service_bootstrap::resource::{cache, database, PoolPolicy, ResourceError, SqlParam};
use tokio_util::sync::CancellationToken;

mod common;

use common::{recorded_hook, Behavior, CallLog};

fn db_at(host: &str, port: u16) -> DbConfig {
    DbConfig {
        user: "svc".into(),
        password: "secret".into(),
        host: host.into(),
        port,
        name: "app".into(),
    }
}

fn redis_at(host: &str, port: u16) -> RedisConfig {
    RedisConfig {
        host: host.into(),
        port,
        ..RedisConfig::default()
    }
}

#[tokio::test]
async fn test_disabled_resources_run_without_network() {
    let mut lifecycle = Lifecycle::default();
    let db = database::provision(
        &DbConfig::default(),
        Environment::Production,
        &PoolPolicy::postgres(),
        &mut lifecycle,
    )
    .unwrap();
    let cache = cache::provision(&RedisConfig::default(), &PoolPolicy::redis(), &mut lifecycle).unwrap();

    let ctx = CancellationToken::new();
    lifecycle.run_starts(&ctx).await.unwrap();

    let err = db
        .query("SELECT * FROM users WHERE id = ?", &[SqlParam::Int(1)])
        .await
        .unwrap_err();
    assert!(err.is_disabled());
    assert!(matches!(cache.get("session").await, Err(ResourceError::Disabled(_))));
    assert_eq!(
        db.rebind("SELECT * FROM users WHERE id = ?"),
        "SELECT * FROM users WHERE id = $1"
    );

    lifecycle.run_stops(&ctx).await.unwrap();
    assert_eq!(lifecycle.phase(), Phase::Stopped);
}

#[tokio::test]
async fn test_db_name_without_host_is_disabled() {
    let mut lifecycle = Lifecycle::default();
    let config = DbConfig {
        host: "   ".into(),
        ..db_at("", 5432)
    };
    let db = database::provision(
        &config,
        Environment::Development,
        &PoolPolicy::postgres(),
        &mut lifecycle,
    )
    .unwrap();
    assert!(!db.is_enabled());
}

#[tokio::test]
async fn test_unreachable_redis_fails_startup() {
    let log = CallLog::default();
    let mut lifecycle = Lifecycle::default();
    cache::provision(&redis_at("127.0.0.1", 1), &PoolPolicy::redis(), &mut lifecycle).unwrap();
    lifecycle
        .register(recorded_hook("http", &log, Behavior::Succeed, Behavior::Succeed))
        .unwrap();

    let err = lifecycle.run_starts(&CancellationToken::new()).await.unwrap_err();
    let LifecycleError::StartFailed { hook, .. } = err else {
        panic!("expected start failure");
    };
    assert_eq!(hook, "redis");
    assert!(log.entries().is_empty());
    assert_eq!(lifecycle.phase(), Phase::Failed);
}

#[tokio::test]
async fn test_unreachable_postgres_fails_startup() {
    let mut lifecycle = Lifecycle::default();
    let policy = PoolPolicy::postgres().with_probe_timeout(Duration::from_millis(500));
    database::provision(
        &db_at("127.0.0.1", 1),
        Environment::Development,
        &policy,
        &mut lifecycle,
    )
    .unwrap();

    let err = lifecycle.run_starts(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::StartFailed { ref hook, .. } if hook == "postgres"));
}

#[tokio::test]
async fn test_silent_redis_probe_exceeds_deadline() {
    let addr = common::start_silent_server().await;
    let log = CallLog::default();
    let mut lifecycle = Lifecycle::default();
    let policy = PoolPolicy::redis().with_probe_timeout(Duration::from_millis(200));
    cache::provision(&redis_at("127.0.0.1", addr.port()), &policy, &mut lifecycle).unwrap();
    lifecycle
        .register(recorded_hook("http", &log, Behavior::Succeed, Behavior::Succeed))
        .unwrap();

    let err = lifecycle.run_starts(&CancellationToken::new()).await.unwrap_err();
    let LifecycleError::StartFailed { hook, source } = err else {
        panic!("expected start failure");
    };
    assert_eq!(hook, "redis");
    assert!(matches!(source, HookError::DeadlineExceeded(d) if d == Duration::from_millis(200)));
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_silent_postgres_probe_exceeds_deadline() {
    let addr = common::start_silent_server().await;
    let mut lifecycle = Lifecycle::default();
    let policy = PoolPolicy::postgres().with_probe_timeout(Duration::from_millis(200));
    database::provision(
        &db_at("127.0.0.1", addr.port()),
        Environment::Development,
        &policy,
        &mut lifecycle,
    )
    .unwrap();

    let err = lifecycle.run_starts(&CancellationToken::new()).await.unwrap_err();
    let LifecycleError::StartFailed { hook, source } = err else {
        panic!("expected start failure");
    };
    assert_eq!(hook, "postgres");
    assert!(source.is_deadline_exceeded());

    // The failed coordinator still closes what it can.
    lifecycle.run_stops(&CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn test_malformed_parameters_fail_before_registration() {
    let mut lifecycle = Lifecycle::default();

    let err = cache::provision(&redis_at("bad host", 6379), &PoolPolicy::redis(), &mut lifecycle)
        .unwrap_err();
    assert!(matches!(err, ResourceError::Configuration { .. }));

    let err = database::provision(
        &db_at("bad host", 5432),
        Environment::Production,
        &PoolPolicy::postgres(),
        &mut lifecycle,
    )
    .unwrap_err();
    assert!(matches!(err, ResourceError::Configuration { .. }));

    assert!(lifecycle.is_empty());
}
