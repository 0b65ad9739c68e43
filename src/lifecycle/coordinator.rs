//! Ordered startup and reverse-order shutdown of registered hooks.
//!
//! # Responsibilities
//! - Hold hooks in registration order
//! - Run start actions one at a time, each under its own deadline
//! - Run stop actions in reverse order under one shared shutdown budget
//! - Track the coordinator phase and refuse out-of-order calls
//!
//! # Design Decisions
//! - Strictly sequential: no two hooks ever run concurrently
//! - First start failure aborts the sequence; nothing is rolled back here
//! - A failing stop never prevents the remaining stops from running
//! - Only hooks whose start completed are stopped

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::hook::{BoxError, Hook};
use crate::observability::metrics;

/// Default budget shared by all stop hooks.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Starting,
    Running,
    Failed,
    Stopping,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::NotStarted => "not-started",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Failed => "failed",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Why a single hook action did not complete.
#[derive(Debug, Error)]
pub enum HookError {
    /// The action returned an error.
    #[error("{0}")]
    Failed(#[source] BoxError),

    /// The action did not finish within its deadline.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The parent context was cancelled while the action was running.
    #[error("cancelled")]
    Cancelled,

    /// The shutdown budget was exhausted before the action got to run.
    #[error("abandoned: shutdown budget exhausted")]
    Abandoned,
}

impl HookError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, HookError::DeadlineExceeded(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, HookError::DeadlineExceeded(_) | HookError::Abandoned)
    }
}

/// A stop hook that failed or timed out.
#[derive(Debug)]
pub struct StopFailure {
    pub hook: String,
    pub error: HookError,
}

/// All stop failures from one shutdown, in the order the stops ran.
#[derive(Debug)]
pub struct ShutdownError {
    pub failures: Vec<StopFailure>,
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stop hook(s) failed: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.hook, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}

/// Errors returned by the [`Lifecycle`] coordinator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation is not valid in the current phase.
    #[error("cannot {operation} while {phase}")]
    InvalidPhase { operation: &'static str, phase: Phase },

    /// Stops already ran; the coordinator is not reusable.
    #[error("lifecycle already stopped")]
    AlreadyStopped,

    /// A start action failed; later hooks were not started.
    #[error("start hook '{hook}' failed: {source}")]
    StartFailed {
        hook: String,
        #[source]
        source: HookError,
    },

    /// One or more stop actions failed or timed out.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

struct Entry {
    hook: Hook,
    started: bool,
}

/// Sequences start and stop hooks for every provisioned resource.
pub struct Lifecycle {
    entries: Vec<Entry>,
    phase: Phase,
    shutdown_timeout: Duration,
}

impl Lifecycle {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            entries: Vec::new(),
            phase: Phase::NotStarted,
            shutdown_timeout,
        }
    }

    /// Append a hook. Only valid before [`run_starts`](Self::run_starts).
    pub fn register(&mut self, hook: Hook) -> Result<(), LifecycleError> {
        if self.phase != Phase::NotStarted {
            return Err(LifecycleError::InvalidPhase {
                operation: "register hooks",
                phase: self.phase,
            });
        }
        tracing::debug!(hook = %hook.name(), position = self.entries.len(), "Hook registered");
        self.entries.push(Entry { hook, started: false });
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of registered hooks, in registration order.
    pub fn hook_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.hook.name()).collect()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Run every start action in registration order.
    ///
    /// Each action gets a child of `ctx` and its own deadline. The first
    /// failure moves the coordinator to [`Phase::Failed`] and is returned;
    /// later hooks never start.
    pub async fn run_starts(&mut self, ctx: &CancellationToken) -> Result<(), LifecycleError> {
        if self.phase != Phase::NotStarted {
            return Err(LifecycleError::InvalidPhase {
                operation: "run starts",
                phase: self.phase,
            });
        }
        self.phase = Phase::Starting;
        tracing::info!(hooks = self.entries.len(), "Lifecycle starting");

        for entry in self.entries.iter_mut() {
            let name = entry.hook.name().to_string();
            let Some(action) = entry.hook.start.take() else {
                entry.started = true;
                continue;
            };

            let started_at = Instant::now();
            let child = ctx.child_token();
            let outcome = tokio::select! {
                res = tokio::time::timeout(action.timeout, (action.run)(child.clone())) => match res {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(HookError::Failed(e)),
                    Err(_) => Err(HookError::DeadlineExceeded(action.timeout)),
                },
                _ = ctx.cancelled() => Err(HookError::Cancelled),
            };
            child.cancel();

            match outcome {
                Ok(()) => {
                    entry.started = true;
                    metrics::record_hook("start", &name, "ok", started_at);
                    tracing::info!(
                        hook = %name,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "Start hook completed"
                    );
                }
                Err(error) => {
                    metrics::record_hook("start", &name, outcome_label(&error), started_at);
                    tracing::error!(hook = %name, error = %error, "Start hook failed, aborting startup");
                    self.phase = Phase::Failed;
                    return Err(LifecycleError::StartFailed { hook: name, source: error });
                }
            }
        }

        self.phase = Phase::Running;
        tracing::info!("Lifecycle running");
        Ok(())
    }

    /// Run every stop action in reverse registration order.
    ///
    /// All stops share the coordinator's shutdown budget; a stop with its
    /// own timeout is bounded by whichever expires first. Stops still
    /// pending when the budget runs out, or when `ctx` is cancelled, are
    /// abandoned and reported. Failures are collected and returned together
    /// once every stop has had its turn.
    pub async fn run_stops(&mut self, ctx: &CancellationToken) -> Result<(), LifecycleError> {
        match self.phase {
            Phase::Running | Phase::Failed => {}
            Phase::Stopped => return Err(LifecycleError::AlreadyStopped),
            phase => {
                return Err(LifecycleError::InvalidPhase {
                    operation: "run stops",
                    phase,
                })
            }
        }
        self.phase = Phase::Stopping;
        tracing::info!(
            timeout_ms = self.shutdown_timeout.as_millis() as u64,
            "Lifecycle stopping"
        );

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let mut failures = Vec::new();

        for entry in self.entries.iter_mut().rev() {
            if !entry.started {
                continue;
            }
            let Some(action) = entry.hook.stop.take() else {
                continue;
            };
            let name = entry.hook.name().to_string();
            let started_at = Instant::now();

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let outcome = if remaining.is_zero() || ctx.is_cancelled() {
                Err(HookError::Abandoned)
            } else {
                let budget = action.timeout.map_or(remaining, |t| t.min(remaining));
                tokio::select! {
                    res = tokio::time::timeout(budget, (action.run)()) => match res {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(HookError::Failed(e)),
                        Err(_) => Err(HookError::DeadlineExceeded(budget)),
                    },
                    _ = ctx.cancelled() => Err(HookError::Cancelled),
                }
            };

            match outcome {
                Ok(()) => {
                    metrics::record_hook("stop", &name, "ok", started_at);
                    tracing::info!(
                        hook = %name,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "Stop hook completed"
                    );
                }
                Err(error) => {
                    metrics::record_hook("stop", &name, outcome_label(&error), started_at);
                    tracing::warn!(hook = %name, error = %error, "Stop hook failed");
                    failures.push(StopFailure { hook: name, error });
                }
            }
        }

        self.phase = Phase::Stopped;

        if failures.is_empty() {
            tracing::info!("Lifecycle stopped");
            Ok(())
        } else {
            Err(ShutdownError { failures }.into())
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("phase", &self.phase)
            .field("hooks", &self.hook_names())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

fn outcome_label(error: &HookError) -> &'static str {
    match error {
        HookError::Failed(_) => "error",
        HookError::DeadlineExceeded(_) => "timeout",
        HookError::Cancelled => "cancelled",
        HookError::Abandoned => "abandoned",
    }
}
