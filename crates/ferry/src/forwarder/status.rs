//! Run phase and the human-readable status line.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::gateway::ChannelId;

/// Lifecycle phase of the forwarding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Running = 1,
    /// The gateway reported the session invalid. A new login is required
    /// before the next start.
    SessionExpired = 2,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::SessionExpired => write!(f, "session_expired"),
        }
    }
}

/// Shared [`RunPhase`] cell.
#[derive(Clone)]
pub(crate) struct PhaseCell(Arc<AtomicU8>);

impl Default for PhaseCell {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(RunPhase::Idle as u8)))
    }
}

impl PhaseCell {
    pub fn get(&self) -> RunPhase {
        match self.0.load(Ordering::Acquire) {
            1 => RunPhase::Running,
            2 => RunPhase::SessionExpired,
            _ => RunPhase::Idle,
        }
    }

    pub fn set(&self, phase: RunPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// Last status message and when it was written.
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    pub message: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Latest human-readable progress message, written by the cycle and by
/// start/stop, read by `status()`.
#[derive(Clone, Default)]
pub struct StatusBoard {
    line: Arc<RwLock<StatusLine>>,
}

impl StatusBoard {
    pub fn update(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        let mut line = self.line.write().unwrap_or_else(|e| e.into_inner());
        line.message = message;
        line.updated_at = Some(Utc::now());
    }

    pub fn current(&self) -> StatusLine {
        self.line.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Snapshot returned by [`EngineHandle::status`](super::EngineHandle::status).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub is_running: bool,
    pub state: RunPhase,
    pub last_message: String,
    /// RFC 3339, empty before the first update.
    pub last_update: String,
    pub is_connected: bool,
    pub error_counts: BTreeMap<ChannelId, u32>,
    pub last_failure_at: BTreeMap<ChannelId, DateTime<Utc>>,
}
