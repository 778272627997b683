use super::state::AppState;
use crate::session::SessionStatus;
use crate::webhook::{self, IngestOutcome, WebhookEvent};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::warn;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub sessions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /webhook
/// Ingest a platform notification. The sender always gets 200 so it never
/// retries; the body says what happened.
pub async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let outcome = match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => webhook::ingest(&state.manager, event).await,
        Err(e) => {
            warn!("Unparseable webhook body: {}", e);
            IngestOutcome::Rejected {
                error: e.to_string(),
            }
        }
    };

    (StatusCode::OK, Json(outcome)).into_response()
}

/// GET /sessions
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.manager.statuses().await;
    (StatusCode::OK, Json(SessionListResponse { sessions })).into_response()
}

/// GET /sessions/:session_id
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.manager.status(&session_id).await {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.manager.active_sessions().await;

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            active_sessions: sessions.len(),
            sessions,
        }),
    )
}
