use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::{AudioFrame, SpeakerId, TrackSet};
use crate::config::{AudioConfig, RecordingConfig};
use crate::error::{CommandError, StageError};
use crate::pipeline::PipelineJob;
use crate::store::{SessionFilter, SessionStore};

use super::record::{Session, SessionFailure};
use super::state::SessionStatus;

/// A session still owned by the front end: the record plus its capture buffers.
struct ActiveSession {
    session: Session,
    tracks: TrackSet,
}

/// Read-only snapshot answered by the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusView {
    pub session_id: Uuid,
    pub name: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub speaker_count: Option<usize>,
    pub dropped_frames: u64,
    pub failure: Option<SessionFailure>,
    pub notify_error: Option<String>,
}

/// The interactive front end: one lock per voice context so frame ingestion
/// can never race a state transition on the same session.
///
/// `stop` enqueues the pipeline job and returns immediately; after that the
/// session lives in the store and is mutated only by the pipeline, still
/// through the transition function.
pub struct SessionManager {
    active: RwLock<HashMap<u64, Arc<Mutex<ActiveSession>>>>,
    store: Arc<dyn SessionStore>,
    queue: mpsc::Sender<PipelineJob>,
    audio: AudioConfig,
    recording: RecordingConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        queue: mpsc::Sender<PipelineJob>,
        audio: AudioConfig,
        recording: RecordingConfig,
    ) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            store,
            queue,
            audio,
            recording,
        }
    }

    /// Start recording in a voice context. At most one active session per
    /// context at a time.
    pub async fn start(
        &self,
        context_id: u64,
        name: Option<String>,
    ) -> Result<Session, CommandError> {
        let mut active = self.active.write().await;

        if active.contains_key(&context_id) {
            return Err(CommandError::AlreadyRecording);
        }

        let session = Session::start(context_id, name, "user");
        info!(session_id = %session.id, context_id, name = %session.name, "Recording started");

        self.store
            .upsert_session(&session)
            .await
            .context("Failed to persist new session")?;

        active.insert(
            context_id,
            Arc::new(Mutex::new(ActiveSession {
                session: session.clone(),
                tracks: TrackSet::new(),
            })),
        );

        Ok(session)
    }

    /// Pause: freeze capture without sealing. Buffered frames are retained.
    pub async fn pause(&self, context_id: u64) -> Result<Session, CommandError> {
        let entry = self.entry(context_id, "pause").await?;
        let mut active = entry.lock().await;

        active.session.transition(SessionStatus::Paused, "pause", "user")?;
        active.tracks.freeze();
        self.store
            .upsert_session(&active.session)
            .await
            .context("Failed to persist pause")?;

        info!(session_id = %active.session.id, "Recording paused");
        Ok(active.session.clone())
    }

    /// Resume a paused session.
    pub async fn resume(&self, context_id: u64) -> Result<Session, CommandError> {
        let entry = self.entry(context_id, "resume").await?;
        let mut active = entry.lock().await;

        active
            .session
            .transition(SessionStatus::Recording, "resume", "user")?;
        active.tracks.reopen();
        self.store
            .upsert_session(&active.session)
            .await
            .context("Failed to persist resume")?;

        info!(session_id = %active.session.id, "Recording resumed");
        Ok(active.session.clone())
    }

    /// Stop: seal capture, record the end timestamp and hand the session to
    /// the pipeline. Returns as soon as the job is enqueued.
    ///
    /// A session with no captured audio fails immediately with
    /// `EmptySession` and never reaches `processing`.
    pub async fn stop(&self, context_id: u64) -> Result<Session, CommandError> {
        let entry = self.entry(context_id, "stop").await?;

        let session = {
            let mut active = entry.lock().await;
            self.stop_locked(&mut active, "user").await?
        };

        self.active.write().await.remove(&context_id);
        Ok(session)
    }

    /// Ingest one tagged audio frame for the context's session.
    ///
    /// Frames are accepted only while recording; while paused (or when no
    /// session exists) they are dropped, with a counter for observability.
    /// A frame stamped past the configured maximum session duration forces
    /// an automatic stop.
    pub async fn ingest_frame(
        &self,
        context_id: u64,
        speaker: &SpeakerId,
        frame: AudioFrame,
    ) -> Result<(), CommandError> {
        let entry = {
            let active = self.active.read().await;
            match active.get(&context_id) {
                Some(entry) => Arc::clone(entry),
                None => return Ok(()), // idle context, nothing to record
            }
        };

        let mut forced_stop = false;
        {
            let mut active = entry.lock().await;

            let max_ms = self.recording.max_session_duration_secs * 1000;
            if active.session.status == SessionStatus::Recording && frame.timestamp_ms >= max_ms {
                warn!(
                    session_id = %active.session.id,
                    timestamp_ms = frame.timestamp_ms,
                    max_ms,
                    "Maximum session duration exceeded, forcing stop"
                );
                // The frame that crossed the limit is itself dropped; count
                // it before the stop so the terminal record is never touched
                // afterwards.
                active.tracks.freeze();
                active.tracks.ingest(speaker, frame);
                self.stop_locked(&mut active, "system").await?;
                forced_stop = true;
            } else {
                active.tracks.ingest(speaker, frame);
            }
        }

        if forced_stop {
            self.active.write().await.remove(&context_id);
        }

        Ok(())
    }

    /// The `status` command: the live session if one exists, otherwise the
    /// last known session for the context from the store.
    pub async fn status(&self, context_id: u64) -> Result<Option<SessionStatusView>, CommandError> {
        let entry = {
            let active = self.active.read().await;
            active.get(&context_id).map(Arc::clone)
        };

        if let Some(entry) = entry {
            let active = entry.lock().await;
            return Ok(Some(SessionStatusView {
                session_id: active.session.id,
                name: active.session.name.clone(),
                status: active.session.status,
                started_at: active.session.started_at,
                duration_seconds: active.session.duration_seconds(),
                speaker_count: Some(active.tracks.speaker_count()),
                dropped_frames: active.tracks.dropped_frames(),
                failure: None,
                notify_error: None,
            }));
        }

        let filter = SessionFilter {
            context_id: Some(context_id),
            status: None,
        };
        let recent = self
            .store
            .list(&filter, 1)
            .await
            .context("Failed to query session store")?;

        Ok(recent.into_iter().next().map(|session| SessionStatusView {
            session_id: session.id,
            name: session.name.clone(),
            status: session.status,
            started_at: session.started_at,
            duration_seconds: session.duration_seconds(),
            speaker_count: None,
            dropped_frames: session.dropped_frames,
            failure: session.failure.clone(),
            notify_error: session.notify_error.clone(),
        }))
    }

    async fn entry(
        &self,
        context_id: u64,
        action: &'static str,
    ) -> Result<Arc<Mutex<ActiveSession>>, CommandError> {
        let active = self.active.read().await;
        active
            .get(&context_id)
            .map(Arc::clone)
            .ok_or(CommandError::InvalidState {
                action,
                state: "idle",
            })
    }

    /// Stop bookkeeping shared by the user command and the forced stop.
    /// Caller holds the session lock and removes the map entry afterwards.
    async fn stop_locked(
        &self,
        active: &mut ActiveSession,
        actor: &str,
    ) -> Result<Session, CommandError> {
        active
            .session
            .transition(SessionStatus::Stopped, "stop", actor)?;
        active.session.ended_at = Some(Utc::now());
        active.tracks.seal();
        active.session.dropped_frames = active.tracks.dropped_frames();
        info!(
            session_id = %active.session.id,
            speakers = active.tracks.speaker_count(),
            dropped_frames = active.session.dropped_frames,
            "Sealed capture buffers"
        );

        // Raw speaker tracks go to disk for diagnostics; best-effort.
        let session_dir = self.audio.storage_path.join(active.session.id.to_string());
        match fs::create_dir_all(&session_dir) {
            Ok(()) => active.tracks.write_speaker_wavs(&session_dir),
            Err(e) => warn!(error = %e, "Failed to create session audio directory"),
        }

        if active.tracks.non_empty_count() == 0 {
            active
                .session
                .transition(SessionStatus::Failed, "stop", actor)?;
            active.session.failure = Some(SessionFailure {
                stage: "stop".to_string(),
                reason: StageError::EmptySession.to_string(),
            });
            warn!(session_id = %active.session.id, "Stopped with no captured audio");
        } else {
            active
                .session
                .transition(SessionStatus::Processing, "stop", actor)?;
        }

        self.store
            .upsert_session(&active.session)
            .await
            .context("Failed to persist stopped session")?;

        if active.session.status == SessionStatus::Processing {
            // The replacement set is sealed so a frame racing the stop is
            // dropped instead of landing in a buffer nobody will read.
            let mut sealed = TrackSet::new();
            sealed.seal();
            let tracks = std::mem::replace(&mut active.tracks, sealed);
            self.queue
                .send(PipelineJob {
                    session_id: active.session.id,
                    tracks,
                })
                .await
                .map_err(|_| anyhow::anyhow!("Pipeline queue is closed"))?;
            info!(session_id = %active.session.id, "Recording stopped, pipeline job enqueued");
        }

        Ok(active.session.clone())
    }
}
