//! Session lifecycle
//!
//! This module provides:
//! - `SessionStatus` and the transition table governing the recording
//!   lifecycle (recording → paused → recording → stopped → processing →
//!   completed/failed)
//! - the `Session` record with its audit trail
//! - `Transcript` / `Analysis` artifact types
//! - `SessionManager`: the per-voice-context front end serializing frame
//!   ingestion and state transitions

mod artifacts;
mod manager;
mod record;
mod state;

pub use artifacts::{Analysis, NamedEntity, NarrativeEvent, Transcript, Utterance};
pub use manager::{SessionManager, SessionStatusView};
pub use record::{Session, SessionFailure};
pub use state::{AuditEvent, SessionStatus};
