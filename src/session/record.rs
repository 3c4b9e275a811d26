use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::CommandError;

use super::state::{AuditEvent, SessionStatus};

/// Why and where a session failed, kept for operator and user visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFailure {
    /// Pipeline stage that exhausted its retries (or "stop" for an empty session)
    pub stage: String,
    pub reason: String,
}

/// One recorded conversation, from start command to final processed artifact.
///
/// Mutated only through `transition`; immutable once completed or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    /// Owning voice context (guild/channel on the chat platform)
    pub context_id: u64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Ordered status-change events
    pub audit_trail: Vec<AuditEvent>,
    /// Frames rejected while paused or after sealing
    pub dropped_frames: u64,
    pub failure: Option<SessionFailure>,
    /// Set when the completion notification could not be delivered;
    /// completion itself stands
    pub notify_error: Option<String>,
    pub merged_audio_path: Option<PathBuf>,
    pub transcription_cost_cents: Option<u32>,
    pub analysis_cost_cents: Option<u32>,
}

impl Session {
    /// Create a session in `Recording`, appending the creating audit event.
    pub fn start(context_id: u64, name: Option<String>, actor: &str) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let name = name.unwrap_or_else(|| format!("session-{}", now.format("%Y%m%d-%H%M%S")));

        Self {
            id,
            name,
            context_id,
            status: SessionStatus::Recording,
            started_at: now,
            ended_at: None,
            audit_trail: vec![AuditEvent {
                at: now,
                actor: actor.to_string(),
                from: None,
                to: SessionStatus::Recording,
            }],
            dropped_frames: 0,
            failure: None,
            notify_error: None,
            merged_audio_path: None,
            transcription_cost_cents: None,
            analysis_cost_cents: None,
        }
    }

    /// The single place the status field is written. Appends an audit event
    /// on success; an illegal transition changes nothing.
    pub fn transition(
        &mut self,
        to: SessionStatus,
        action: &'static str,
        actor: &str,
    ) -> Result<(), CommandError> {
        if !self.status.can_transition_to(to) {
            return Err(CommandError::InvalidState {
                action,
                state: self.status.as_str(),
            });
        }

        self.audit_trail.push(AuditEvent {
            at: Utc::now(),
            actor: actor.to_string(),
            from: Some(self.status),
            to,
        });
        self.status = to;
        Ok(())
    }

    pub fn duration_seconds(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at).num_seconds()
    }
}
