//! Session Gateway protocol for Ferry.
//!
//! Ferry never talks to the messaging platform directly. Login, verification
//! codes, two-factor and session persistence are owned by a gateway program;
//! Ferry spawns it and exchanges JSON Lines over its stdio:
//!
//! ```text
//!  Ferry ── GatewayRequest (one JSON object per line) ──▶ gateway stdin
//!  Ferry ◀── GatewayReply  (one JSON object per line) ── gateway stdout
//! ```
//!
//! Every request carries an `id`; the gateway echoes it on the reply. A reply
//! holds either a `result` (shape depends on the command) or an `error`.
//!
//! ```json
//! {"id":"01j...","op":"fetch_messages","channel_id":-1001,"after_id":0,"limit":100}
//! {"id":"01j...","result":{"messages":[{"id":1,"group_key":null}]}}
//! {"id":"01j...","error":{"kind":"rate_limited","wait_seconds":7,"message":"flood wait"}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform channel identifier. Channels on most platforms use negative ids.
pub type ChannelId = i64;

/// Message identifier, monotonically increasing within a channel.
pub type MessageId = i64;

// ============================================================================
// Messages
// ============================================================================

/// A message as read from a source channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    /// Shared identifier of co-posted media (an album).
    #[serde(default)]
    pub group_key: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// Opaque platform payload. Ferry never inspects it.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl RawMessage {
    pub fn new(id: MessageId, group_key: Option<i64>) -> Self {
        Self {
            id,
            group_key,
            date: None,
            payload: serde_json::Value::Null,
        }
    }

    /// Key used to bucket messages into delivery units.
    ///
    /// Ungrouped messages fall back to their own id.
    pub fn unit_key(&self) -> i64 {
        self.group_key.unwrap_or(self.id)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A request sent from Ferry to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub id: String,
    #[serde(flatten)]
    pub command: GatewayCommand,
}

/// Operations a gateway must implement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Reply with [`AuthStatus`].
    IsAuthenticated,
    /// Reply with a [`MessagePage`]: messages with `id > after_id`, ascending,
    /// at most `limit` of them. An empty page means the channel is exhausted.
    FetchMessages {
        channel_id: ChannelId,
        after_id: MessageId,
        limit: u32,
    },
    /// Forward the listed messages as one unit. Reply with an empty object.
    Forward {
        from_channel_id: ChannelId,
        to_channel_id: ChannelId,
        message_ids: Vec<MessageId>,
    },
}

impl GatewayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsAuthenticated => "is_authenticated",
            Self::FetchMessages { .. } => "fetch_messages",
            Self::Forward { .. } => "forward",
        }
    }
}

// ============================================================================
// Replies
// ============================================================================

/// A reply from the gateway, correlated to a request by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayReply {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayFailure>,
}

impl GatewayReply {
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: GatewayFailure) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }
}

/// Result of [`GatewayCommand::IsAuthenticated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
}

/// Result of [`GatewayCommand::FetchMessages`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// Failure classes a gateway reports.
///
/// The gateway is responsible for mapping platform errors onto these kinds;
/// rate limits must carry the mandated wait as a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayFailure {
    RateLimited {
        wait_seconds: u64,
        #[serde(default)]
        message: String,
    },
    /// Write forbidden or channel private.
    PermissionDenied {
        #[serde(default)]
        message: String,
    },
    /// Session expired or auth key unregistered. Requires a new login.
    SessionInvalid {
        #[serde(default)]
        message: String,
    },
    Transient {
        #[serde(default)]
        message: String,
    },
}
