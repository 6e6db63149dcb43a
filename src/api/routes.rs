//! API route definitions
//!
//! - /health - liveness
//! - /api/v1/state - full coach snapshot
//! - /api/v1/session/{start,pause,end} - session control
//! - /api/v1/utterance - route a typed utterance as if it were heard

use axum::{routing::{get, post}, Router};

use super::handlers::{self, ApiState};

/// Versioned control routes, nested under `/api/v1`.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/session/start", post(handlers::start_session))
        .route("/session/pause", post(handlers::pause_session))
        .route("/session/end", post(handlers::end_session))
        .route("/utterance", post(handlers::post_utterance))
        .with_state(state)
}

/// Root-level liveness endpoint
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state)
}
