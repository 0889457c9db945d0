//! Session gateway error types.

use std::time::Duration;

use ferry_gateway_protocol::GatewayFailure;
use thiserror::Error;

/// Errors surfaced by a [`SessionGateway`](super::SessionGateway).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The platform demands a pause before the next request.
    #[error("rate limited (retry after {}s)", wait.as_secs())]
    RateLimited { wait: Duration },

    /// Write forbidden or channel private. Retrying will not help.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Session expired or auth key revoked. Requires a new login.
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    #[error("transient failure: {0}")]
    Transient(String),

    /// Talking to the gateway process failed.
    #[error("gateway io failed: {0}")]
    Io(#[from] std::io::Error),

    /// The gateway sent something we could not understand.
    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

/// Shortest pause honored for a rate limit. A zero wait would otherwise
/// retry in a tight loop.
pub const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Coarse classification used by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Wait this long, then retry without spending an attempt.
    RateLimit(Duration),
    PermissionDenied,
    SessionInvalid,
    Transient,
}

impl GatewayError {
    pub fn class(&self) -> FailureClass {
        match self {
            GatewayError::RateLimited { wait } => {
                FailureClass::RateLimit((*wait).max(MIN_RATE_LIMIT_WAIT))
            }
            GatewayError::PermissionDenied(_) => FailureClass::PermissionDenied,
            GatewayError::SessionInvalid(_) => FailureClass::SessionInvalid,
            GatewayError::Transient(_) | GatewayError::Io(_) | GatewayError::Protocol(_) => {
                FailureClass::Transient
            }
        }
    }

    pub fn is_session_invalid(&self) -> bool {
        self.class() == FailureClass::SessionInvalid
    }
}

impl From<GatewayFailure> for GatewayError {
    fn from(failure: GatewayFailure) -> Self {
        match failure {
            GatewayFailure::RateLimited { wait_seconds, .. } => GatewayError::RateLimited {
                wait: Duration::from_secs(wait_seconds),
            },
            GatewayFailure::PermissionDenied { message } => GatewayError::PermissionDenied(message),
            GatewayFailure::SessionInvalid { message } => GatewayError::SessionInvalid(message),
            GatewayFailure::Transient { message } => GatewayError::Transient(message),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Protocol(err.to_string())
    }
}
