//! API route handlers
//!
//! Thin wrappers over [`CoachingOrchestrator`]: every handler reads or drives
//! the shared session and wraps the result in the response envelope.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::pipeline::CoachingOrchestrator;
use crate::types::SessionState;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: CoachingOrchestrator,
}

impl ApiState {
    pub fn new(orchestrator: CoachingOrchestrator) -> Self {
        Self { orchestrator }
    }
}

// ============================================================================
// Bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub session: SessionState,
}

/// Result of a session control request. `changed` is false when the session
/// was already in a state where the request had no effect.
#[derive(Debug, Serialize)]
pub struct SessionChange {
    pub changed: bool,
    pub session: SessionState,
}

#[derive(Debug, Deserialize)]
pub struct UtteranceRequest {
    pub text: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn get_health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthBody {
        status: "ok",
        session: state.orchestrator.session_state(),
    })
}

/// GET /api/v1/state
pub async fn get_state(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.orchestrator.snapshot())
}

/// POST /api/v1/session/start
pub async fn start_session(State(state): State<ApiState>) -> Response {
    let changed = state.orchestrator.start_session();
    info!(changed, "[API] Session start requested");
    session_change(&state, changed)
}

/// POST /api/v1/session/pause
pub async fn pause_session(State(state): State<ApiState>) -> Response {
    let changed = state.orchestrator.pause_session();
    info!(changed, "[API] Session pause requested");
    session_change(&state, changed)
}

/// POST /api/v1/session/end
pub async fn end_session(State(state): State<ApiState>) -> Response {
    let changed = state.orchestrator.end_session();
    info!(changed, "[API] Session end requested");
    session_change(&state, changed)
}

/// POST /api/v1/utterance
pub async fn post_utterance(
    State(state): State<ApiState>,
    body: Result<Json<UtteranceRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };
    if request.text.is_empty() {
        return ApiErrorResponse::bad_request("text must not be empty");
    }

    let outcome = state.orchestrator.submit_utterance(&request.text).await;
    debug!(?outcome, "[API] Utterance handled");
    ApiResponse::ok(outcome)
}

fn session_change(state: &ApiState, changed: bool) -> Response {
    ApiResponse::ok(SessionChange {
        changed,
        session: state.orchestrator.session_state(),
    })
}
