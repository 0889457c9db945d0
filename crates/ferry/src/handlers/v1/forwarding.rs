//! Forwarding control HTTP handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;
use tracing::warn;

use crate::config::default_send_interval;
use crate::forwarder::{ChannelPair, EngineStatus, StartError, StopError};
use crate::response::{self, ActionReply};
use crate::server::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingSettings {
    pairs: Vec<ChannelPair>,
    #[serde(default = "default_send_interval", alias = "send_interval_seconds")]
    send_interval: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// PUT /api/v1/forwarding/config
pub async fn configure(
    State(state): State<AppState>,
    Json(req): Json<ForwardingSettings>,
) -> ActionReply {
    match state.engine.configure(req.pairs, req.send_interval) {
        Ok(()) => response::ok("Configuration saved"),
        Err(e) => response::bad_request(e.to_string()),
    }
}

/// POST /api/v1/forwarding/start
///
/// An optional `{"pairs": [...], "sendInterval": 30}` body replaces the
/// configuration before starting.
pub async fn start(State(state): State<AppState>, body: Bytes) -> ActionReply {
    if !body.is_empty() {
        let req: ForwardingSettings = match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => return response::bad_request(format!("Invalid request body: {e}")),
        };
        if let Err(e) = state.engine.configure(req.pairs, req.send_interval) {
            return response::bad_request(e.to_string());
        }
    }

    match state.engine.start().await {
        Ok(()) => response::ok("Forwarding started successfully"),
        Err(e @ StartError::AlreadyRunning) => response::conflict(e.to_string()),
        Err(e @ StartError::NotAuthenticated) => {
            warn!("Start rejected: gateway not authenticated");
            response::service_unavailable(e.to_string())
        }
        Err(e @ StartError::NotConfigured) => response::bad_request(e.to_string()),
    }
}

/// POST /api/v1/forwarding/stop
///
/// Returns once the forwarding task has fully ended.
pub async fn stop(State(state): State<AppState>) -> ActionReply {
    match state.engine.stop().await {
        Ok(()) => response::ok("Forwarding stopped successfully"),
        Err(e @ StopError::NotRunning) => response::conflict(e.to_string()),
        Err(e @ StopError::Interrupted) => response::internal_error(e.to_string()),
    }
}

/// GET /api/v1/forwarding/status
pub async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status().await)
}
