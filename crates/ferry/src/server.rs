use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::forwarder::EngineHandle;
use crate::handlers;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

/// Build the HTTP router (shared between production startup and tests).
///
/// CORS is open to any origin: the control UI is served from a different
/// port than the API.
pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        .route("/forwarding/config", put(handlers::v1::configure))
        .route("/forwarding/start", post(handlers::v1::start))
        .route("/forwarding/stop", post(handlers::v1::stop))
        .route("/forwarding/status", get(handlers::v1::status))
        .with_state(state);

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .nest("/api/v1", api_v1)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
        .layer(cors)
}
