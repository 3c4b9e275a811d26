//! HTTP API server for session control
//!
//! This module provides a REST API mapping 1:1 to session commands:
//! - POST /contexts/:context_id/start - Start recording in a voice context
//! - POST /contexts/:context_id/stop - Stop and enqueue processing
//! - POST /contexts/:context_id/pause - Pause capture
//! - POST /contexts/:context_id/resume - Resume capture
//! - GET /contexts/:context_id/status - Current or last known session
//! - GET /sessions - List stored sessions
//! - GET /sessions/:session_id - Full session bundle with artifacts
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
