use crate::session::SessionManager;
use crate::store::SessionStore;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Command surface over active sessions
    pub manager: Arc<SessionManager>,
    /// Read access to stored sessions and artifacts
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>, store: Arc<dyn SessionStore>) -> Self {
        Self { manager, store }
    }
}
