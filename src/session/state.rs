use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session. There is no explicit idle state: absence
/// of a session for a voice context is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Recording,
    Paused,
    Stopped,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Recording => "recording",
            SessionStatus::Paused => "paused",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    /// Terminal sessions are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// The transition table. Everything not listed is an illegal transition.
    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Recording, Paused)
                | (Paused, Recording)
                | (Recording, Stopped)
                | (Paused, Stopped)
                | (Stopped, Processing)
                | (Stopped, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a session's audit trail, appended on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    /// Who drove the transition: "user", "system" (forced stop) or "pipeline"
    pub actor: String,
    /// None for the creating event
    pub from: Option<SessionStatus>,
    pub to: SessionStatus,
}
