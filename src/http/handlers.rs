use super::state::AppState;
use crate::error::CommandError;
use crate::session::{Session, SessionStatus};
use crate::store::SessionFilter;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct StartSessionRequest {
    /// Optional display name (if not provided, one is generated)
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub name: String,
    pub status: SessionStatus,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub context_id: Option<u64>,
    pub status: Option<SessionStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn session_response(session: Session, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(SessionResponse {
            session_id: session.id,
            name: session.name,
            status: session.status,
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn command_error_response(err: CommandError) -> Response {
    let status = match &err {
        CommandError::InvalidState { .. } | CommandError::AlreadyRecording => StatusCode::CONFLICT,
        CommandError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        CommandError::Internal(e) => {
            error!("Internal error handling command: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /contexts/:context_id/start
/// Start recording in a voice context
pub async fn start_session(
    State(state): State<AppState>,
    Path(context_id): Path<u64>,
    body: Option<Json<StartSessionRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    match state.manager.start(context_id, req.name).await {
        Ok(session) => session_response(session, "Recording started"),
        Err(e) => command_error_response(e),
    }
}

/// POST /contexts/:context_id/stop
/// Stop recording and hand the session to the processing pipeline
pub async fn stop_session(
    State(state): State<AppState>,
    Path(context_id): Path<u64>,
) -> impl IntoResponse {
    match state.manager.stop(context_id).await {
        Ok(session) => session_response(session, "Recording stopped"),
        Err(e) => command_error_response(e),
    }
}

/// POST /contexts/:context_id/pause
/// Pause capture without ending the session
pub async fn pause_session(
    State(state): State<AppState>,
    Path(context_id): Path<u64>,
) -> impl IntoResponse {
    match state.manager.pause(context_id).await {
        Ok(session) => session_response(session, "Recording paused"),
        Err(e) => command_error_response(e),
    }
}

/// POST /contexts/:context_id/resume
/// Resume a paused session
pub async fn resume_session(
    State(state): State<AppState>,
    Path(context_id): Path<u64>,
) -> impl IntoResponse {
    match state.manager.resume(context_id).await {
        Ok(session) => session_response(session, "Recording resumed"),
        Err(e) => command_error_response(e),
    }
}

/// GET /contexts/:context_id/status
/// Current session for the context, or the last known one from the store
pub async fn get_context_status(
    State(state): State<AppState>,
    Path(context_id): Path<u64>,
) -> impl IntoResponse {
    match state.manager.status(context_id).await {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No session known for context {}", context_id),
            }),
        )
            .into_response(),
        Err(e) => command_error_response(e),
    }
}

/// GET /sessions/:session_id
/// Full stored session with its artifacts
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get(session_id).await {
        Ok(Some(bundle)) => (StatusCode::OK, Json(bundle)).into_response(),
        Ok(None) => command_error_response(CommandError::SessionNotFound(session_id)),
        Err(e) => command_error_response(CommandError::Internal(e)),
    }
}

/// GET /sessions
/// List stored sessions, newest first
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> impl IntoResponse {
    let filter = SessionFilter {
        context_id: query.context_id,
        status: query.status,
    };
    let limit = query.limit.unwrap_or(20);

    match state.store.list(&filter, limit).await {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(e) => command_error_response(CommandError::Internal(e)),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
