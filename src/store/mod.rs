//! Session store accessor
//!
//! The core treats the store as a transactional sink: atomic upserts keyed
//! by session id plus lookup and listing. `MemoryStore` is the in-process
//! implementation; a relational backend satisfies the same trait.

mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::audio::MergedAudio;
use crate::pipeline::PipelineCheckpoint;
use crate::session::{Analysis, Session, SessionStatus, Transcript};

pub use memory::MemoryStore;

/// A session and whatever artifacts exist for it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionBundle {
    pub session: Session,
    pub merged: Option<MergedAudio>,
    pub transcript: Option<Transcript>,
    pub analysis: Option<Analysis>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub context_id: Option<u64>,
    pub status: Option<SessionStatus>,
}

/// Durable record sink for sessions and their artifacts.
///
/// All artifact writes are upserts keyed by session id: re-running a
/// pipeline stage replaces its artifact, never appends a duplicate.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert_session(&self, session: &Session) -> Result<()>;

    async fn upsert_merged(&self, session_id: Uuid, merged: &MergedAudio) -> Result<()>;

    async fn upsert_transcript(&self, session_id: Uuid, transcript: &Transcript) -> Result<()>;

    async fn upsert_analysis(&self, session_id: Uuid, analysis: &Analysis) -> Result<()>;

    /// Atomic completion write: session + transcript + analysis land as one
    /// logical unit, so readers never observe a completed session with only
    /// part of its artifacts.
    async fn save(
        &self,
        session: &Session,
        transcript: &Transcript,
        analysis: &Analysis,
    ) -> Result<()>;

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionBundle>>;

    /// Sessions matching the filter, newest first.
    async fn list(&self, filter: &SessionFilter, limit: usize) -> Result<Vec<Session>>;

    async fn load_checkpoint(&self, session_id: Uuid) -> Result<Option<PipelineCheckpoint>>;

    async fn save_checkpoint(&self, checkpoint: &PipelineCheckpoint) -> Result<()>;
}
