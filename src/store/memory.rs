use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audio::MergedAudio;
use crate::pipeline::PipelineCheckpoint;
use crate::session::{Analysis, Session, Transcript};

use super::{SessionBundle, SessionFilter, SessionStore};

/// In-memory session store. All mutation happens under a single write lock,
/// which is what makes `save` atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    bundles: HashMap<Uuid, SessionBundle>,
    checkpoints: HashMap<Uuid, PipelineCheckpoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .bundles
            .entry(session.id)
            .and_modify(|b| b.session = session.clone())
            .or_insert_with(|| SessionBundle {
                session: session.clone(),
                merged: None,
                transcript: None,
                analysis: None,
            });
        Ok(())
    }

    async fn upsert_merged(&self, session_id: Uuid, merged: &MergedAudio) -> Result<()> {
        let mut inner = self.inner.write().await;
        let bundle = inner
            .bundles
            .get_mut(&session_id)
            .ok_or_else(|| anyhow!("session {} not found", session_id))?;
        bundle.merged = Some(merged.clone());
        bundle.session.merged_audio_path = Some(merged.file_path.clone());
        Ok(())
    }

    async fn upsert_transcript(&self, session_id: Uuid, transcript: &Transcript) -> Result<()> {
        let mut inner = self.inner.write().await;
        let bundle = inner
            .bundles
            .get_mut(&session_id)
            .ok_or_else(|| anyhow!("session {} not found", session_id))?;
        bundle.transcript = Some(transcript.clone());
        Ok(())
    }

    async fn upsert_analysis(&self, session_id: Uuid, analysis: &Analysis) -> Result<()> {
        let mut inner = self.inner.write().await;
        let bundle = inner
            .bundles
            .get_mut(&session_id)
            .ok_or_else(|| anyhow!("session {} not found", session_id))?;
        bundle.analysis = Some(analysis.clone());
        Ok(())
    }

    async fn save(
        &self,
        session: &Session,
        transcript: &Transcript,
        analysis: &Analysis,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let bundle = inner
            .bundles
            .entry(session.id)
            .or_insert_with(|| SessionBundle {
                session: session.clone(),
                merged: None,
                transcript: None,
                analysis: None,
            });
        bundle.session = session.clone();
        bundle.transcript = Some(transcript.clone());
        bundle.analysis = Some(analysis.clone());
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionBundle>> {
        let inner = self.inner.read().await;
        Ok(inner.bundles.get(&session_id).cloned())
    }

    async fn list(&self, filter: &SessionFilter, limit: usize) -> Result<Vec<Session>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .bundles
            .values()
            .map(|b| b.session.clone())
            .filter(|s| filter.context_id.map_or(true, |ctx| s.context_id == ctx))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .collect();

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn load_checkpoint(&self, session_id: Uuid) -> Result<Option<PipelineCheckpoint>> {
        let inner = self.inner.read().await;
        Ok(inner.checkpoints.get(&session_id).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: &PipelineCheckpoint) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .checkpoints
            .insert(checkpoint.session_id, checkpoint.clone());
        Ok(())
    }
}
