//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use service_bootstrap::lifecycle::Hook;
use service_bootstrap::Config;
use tokio::net::TcpListener;

/// Default start timeout for recorded hooks.
pub const HOOK_TIMEOUT: Duration = Duration::from_millis(200);

/// Config bound to an ephemeral loopback port with both resources disabled.
///
/// Drain and shutdown timeouts are equal, as in the defaults, scaled down.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.app.host = "127.0.0.1".into();
    config.app.port = 0;
    config.app.drain_timeout = Duration::from_secs(2);
    config.app.shutdown_timeout = Duration::from_secs(2);
    config
}

/// Start a TCP server that accepts connections and never writes a byte.
pub async fn start_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Ordered record of hook invocations, shared across hooks.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What a recorded action does once invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
}

async fn behave(name: &str, behavior: Behavior) -> Result<(), std::io::Error> {
    match behavior {
        Behavior::Succeed => Ok(()),
        Behavior::Fail => Err(std::io::Error::other(format!("{} failed", name))),
        Behavior::Hang => {
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

/// A hook that logs `start:<name>` / `stop:<name>` and then behaves as told.
pub fn recorded_hook(name: &'static str, log: &CallLog, start: Behavior, stop: Behavior) -> Hook {
    let start_log = log.clone();
    let stop_log = log.clone();
    Hook::new(name)
        .on_start(HOOK_TIMEOUT, move |_ctx| async move {
            start_log.push(format!("start:{}", name));
            behave(name, start).await
        })
        .on_stop(move || async move {
            stop_log.push(format!("stop:{}", name));
            behave(name, stop).await
        })
}
