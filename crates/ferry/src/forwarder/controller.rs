//! Run controller: start/stop lifecycle of the forwarding task.
//!
//! ```text
//!            start (authenticated)          stop
//!   Idle ─────────────────────────▶ Running ─────▶ Idle
//!                                      │
//!                                      │ gateway: session invalid
//!                                      ▼
//!                                SessionExpired ── start (after re-login) ──▶ Running
//! ```
//!
//! `start`/`stop` own the task handle and the phase transitions into and out
//! of `Running`. The task owns the status line and the health ledger writes,
//! and may only move the phase to `SessionExpired`.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cycle::{self, CycleContext, Tuning};
use super::health::HealthLedger;
use super::pair::ChannelPair;
use super::status::{EngineStatus, PhaseCell, RunPhase, StatusBoard};
use crate::config::default_send_interval;
use crate::gateway::SessionGateway;

// ============================================================================
// Errors
// ============================================================================

/// Rejected configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigureError {
    #[error("at least one channel pair is required")]
    NoPairs,

    #[error("pair '{0}' has no recipients")]
    NoRecipients(String),

    #[error("send interval must be at least 1 second")]
    InvalidInterval,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("forwarding is already running")]
    AlreadyRunning,

    #[error("session gateway is not authenticated")]
    NotAuthenticated,

    #[error("no channel pairs configured")]
    NotConfigured,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StopError {
    #[error("forwarding is not running")]
    NotRunning,

    #[error("stopping forwarding was interrupted")]
    Interrupted,
}

// ============================================================================
// EngineHandle
// ============================================================================

/// Pairs and pacing applied by the next `start`.
#[derive(Debug, Clone)]
struct RunSettings {
    pairs: Vec<ChannelPair>,
    send_interval: Duration,
}

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct EngineInner {
    gateway: Arc<dyn SessionGateway>,
    tuning: Tuning,
    settings: RwLock<RunSettings>,
    active: Mutex<Option<ActiveRun>>,
    phase: PhaseCell,
    health: HealthLedger,
    status: StatusBoard,
}

/// Cloneable handle to the single forwarding engine of this process.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineInner>,
}

impl EngineHandle {
    pub fn new(gateway: Arc<dyn SessionGateway>) -> Self {
        Self::with_tuning(gateway, Tuning::default())
    }

    pub(crate) fn with_tuning(gateway: Arc<dyn SessionGateway>, tuning: Tuning) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                gateway,
                tuning,
                settings: RwLock::new(RunSettings {
                    pairs: Vec::new(),
                    send_interval: Duration::from_secs(default_send_interval()),
                }),
                active: Mutex::new(None),
                phase: PhaseCell::default(),
                health: HealthLedger::new(),
                status: StatusBoard::default(),
            }),
        }
    }

    /// Replace the pairs and send interval used by the next `start`.
    ///
    /// A run in progress keeps the settings it was started with.
    pub fn configure(
        &self,
        pairs: Vec<ChannelPair>,
        send_interval_seconds: u64,
    ) -> Result<(), ConfigureError> {
        if pairs.is_empty() {
            return Err(ConfigureError::NoPairs);
        }
        if let Some(pair) = pairs.iter().find(|p| p.recipient_ids.is_empty()) {
            return Err(ConfigureError::NoRecipients(pair.id.clone()));
        }
        if send_interval_seconds == 0 {
            return Err(ConfigureError::InvalidInterval);
        }

        debug!(pairs = pairs.len(), send_interval_seconds, "Forwarding configured");
        let mut settings = self
            .inner
            .settings
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *settings = RunSettings {
            pairs,
            send_interval: Duration::from_secs(send_interval_seconds),
        };
        Ok(())
    }

    /// Spawn the forwarding task.
    pub async fn start(&self) -> Result<(), StartError> {
        let mut active = self.inner.active.lock().await;

        if let Some(run) = active.as_ref()
            && !run.task.is_finished()
        {
            return Err(StartError::AlreadyRunning);
        }
        // The previous task ended on its own (session expired).
        if let Some(run) = active.take() {
            reap(run.task).await;
        }

        match self.inner.gateway.is_authenticated().await {
            Ok(true) => {}
            Ok(false) => return Err(StartError::NotAuthenticated),
            Err(e) => {
                warn!(error = %e, "Could not check gateway session");
                return Err(StartError::NotAuthenticated);
            }
        }

        let settings = self
            .inner
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if settings.pairs.is_empty() {
            return Err(StartError::NotConfigured);
        }

        self.inner.health.clear();
        self.inner.phase.set(RunPhase::Running);

        let cancel = CancellationToken::new();
        let ctx = CycleContext {
            gateway: self.inner.gateway.clone(),
            pairs: settings.pairs,
            send_interval: settings.send_interval,
            tuning: self.inner.tuning.clone(),
            health: self.inner.health.clone(),
            status: self.inner.status.clone(),
            phase: self.inner.phase.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(cycle::run(ctx));
        *active = Some(ActiveRun { cancel, task });

        self.inner.status.update("Forwarding started");
        Ok(())
    }

    /// Cancel the forwarding task and wait until it has fully ended.
    ///
    /// The stop runs on its own task, so a caller that gives up waiting (a
    /// dropped request) does not leave the engine half stopped. Until it
    /// completes, `start` waits on the run slot.
    pub async fn stop(&self) -> Result<(), StopError> {
        let inner = self.inner.clone();
        match tokio::spawn(async move { inner.stop_run().await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Stopping the forwarding task failed");
                Err(StopError::Interrupted)
            }
        }
    }

    /// Current phase, last status line, connection state and per-destination
    /// failure counts.
    pub async fn status(&self) -> EngineStatus {
        let is_connected = match self.inner.gateway.is_authenticated().await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                debug!(error = %e, "Gateway session check failed");
                false
            }
        };

        let phase = self.inner.phase.get();
        let line = self.inner.status.current();
        let health = self.inner.health.snapshot();

        EngineStatus {
            is_running: phase == RunPhase::Running,
            state: phase,
            last_message: line.message,
            last_update: line
                .updated_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            is_connected,
            error_counts: health
                .iter()
                .map(|(id, r)| (*id, r.consecutive_failures))
                .collect(),
            last_failure_at: health
                .iter()
                .filter_map(|(id, r)| r.last_failure_at.map(|t| (*id, t)))
                .collect(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.inner.phase.get()
    }

    /// Stop forwarding if it runs, then release the gateway.
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(()) => info!("Forwarding stopped for shutdown"),
            Err(StopError::NotRunning) => {}
            Err(e) => warn!(error = %e, "Forwarding did not stop cleanly"),
        }
        self.inner.gateway.shutdown().await;
    }

    #[cfg(test)]
    pub(crate) fn health(&self) -> &HealthLedger {
        &self.inner.health
    }
}

impl EngineInner {
    async fn stop_run(&self) -> Result<(), StopError> {
        let mut active = self.active.lock().await;

        let Some(run) = active.as_mut() else {
            return Err(StopError::NotRunning);
        };
        if run.task.is_finished() {
            if let Some(run) = active.take() {
                reap(run.task).await;
            }
            return Err(StopError::NotRunning);
        }

        // The run stays in its slot until the task has ended.
        run.cancel.cancel();
        log_join((&mut run.task).await);
        *active = None;
        self.phase.set(RunPhase::Idle);

        self.status.update("Forwarding stopped");
        Ok(())
    }
}

async fn reap(task: JoinHandle<()>) {
    log_join(task.await);
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Forwarding task ended abnormally");
    }
}
