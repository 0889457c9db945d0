//! JSON response helpers for the control API.

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Body of every control action (`start`, `stop`, `config`) and every error.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

pub type ActionReply = (StatusCode, Json<ActionResponse>);

fn reply(status: StatusCode, success: bool, message: impl Into<String>) -> ActionReply {
    (
        status,
        Json(ActionResponse {
            success,
            message: message.into(),
        }),
    )
}

pub fn ok(message: impl Into<String>) -> ActionReply {
    reply(StatusCode::OK, true, message)
}

pub fn bad_request(message: impl Into<String>) -> ActionReply {
    reply(StatusCode::BAD_REQUEST, false, message)
}

pub fn conflict(message: impl Into<String>) -> ActionReply {
    reply(StatusCode::CONFLICT, false, message)
}

pub fn service_unavailable(message: impl Into<String>) -> ActionReply {
    reply(StatusCode::SERVICE_UNAVAILABLE, false, message)
}

pub fn internal_error(message: impl Into<String>) -> ActionReply {
    reply(StatusCode::INTERNAL_SERVER_ERROR, false, message)
}
