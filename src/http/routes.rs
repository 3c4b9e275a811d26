use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/contexts/:context_id/start", post(handlers::start_session))
        .route("/contexts/:context_id/stop", post(handlers::stop_session))
        .route("/contexts/:context_id/pause", post(handlers::pause_session))
        .route(
            "/contexts/:context_id/resume",
            post(handlers::resume_session),
        )
        // Session queries
        .route(
            "/contexts/:context_id/status",
            get(handlers::get_context_status),
        )
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", get(handlers::get_session))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
