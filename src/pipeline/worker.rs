use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audio::{merge_tracks, MergedAudio};
use crate::config::{AudioConfig, PipelineConfig};
use crate::error::{ServiceError, StageError};
use crate::notify::{render_report, Notifier};
use crate::services::{
    estimate_analysis_cost_cents, estimate_transcription_cost_cents, Analyzer, Transcriber,
};
use crate::session::{Analysis, Session, SessionFailure, SessionStatus, Transcript};
use crate::store::{SessionBundle, SessionStore};

use super::job::{PipelineCheckpoint, PipelineJob, Stage};

/// Executes pipeline jobs: one spawned task per session, stages strictly in
/// order within a session, sessions independent of each other. The worker
/// shares nothing with the front end except the store and the job queue.
pub struct PipelineWorker {
    store: Arc<dyn SessionStore>,
    transcriber: Arc<dyn Transcriber>,
    analyzer: Arc<dyn Analyzer>,
    notifier: Arc<dyn Notifier>,
    pipeline: PipelineConfig,
    audio: AudioConfig,
}

impl PipelineWorker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        transcriber: Arc<dyn Transcriber>,
        analyzer: Arc<dyn Analyzer>,
        notifier: Arc<dyn Notifier>,
        pipeline: PipelineConfig,
        audio: AudioConfig,
    ) -> Self {
        Self {
            store,
            transcriber,
            analyzer,
            notifier,
            pipeline,
            audio,
        }
    }

    /// Consume jobs from the queue, running each session's pipeline on its
    /// own task so sessions process concurrently.
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::Receiver<PipelineJob>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Pipeline worker started");
            while let Some(job) = rx.recv().await {
                let worker = Arc::clone(&self);
                tokio::spawn(async move {
                    worker.run_job(job).await;
                });
            }
            info!("Pipeline worker stopped");
        })
    }

    /// Run one session's pipeline to completion or exhausted retries.
    pub async fn run_job(&self, job: PipelineJob) {
        info!(session_id = %job.session_id, "Starting processing pipeline");

        if let Err((stage, err)) = self.execute(&job).await {
            self.mark_failed(job.session_id, stage, &err).await;
        }
    }

    async fn execute(&self, job: &PipelineJob) -> Result<(), (Stage, StageError)> {
        let sid = job.session_id;

        let mut cp = self
            .store
            .load_checkpoint(sid)
            .await
            .map_err(|e| (Stage::Merge, StageError::Store(e.to_string())))?
            .unwrap_or_else(|| PipelineCheckpoint::new(sid));

        let merged = self.run_merge(job, &mut cp).await?;
        let transcript = self.run_transcribe(sid, &merged, &mut cp).await?;
        let analysis = self.run_analyze(sid, &transcript, &mut cp).await?;
        self.run_persist(sid, &merged, &transcript, &analysis, &mut cp)
            .await?;
        self.run_notify(sid, &mut cp).await?;

        info!(session_id = %sid, "Processing pipeline completed");
        Ok(())
    }

    async fn run_merge(
        &self,
        job: &PipelineJob,
        cp: &mut PipelineCheckpoint,
    ) -> Result<MergedAudio, (Stage, StageError)> {
        let sid = job.session_id;

        if cp.is_done(Stage::Merge) {
            return self
                .load_bundle(sid, Stage::Merge)
                .await?
                .merged
                .ok_or((Stage::Merge, missing_artifact("merged audio")));
        }

        let merged = self
            .retry(sid, Stage::Merge, || {
                let result = merge_tracks(
                    sid,
                    &job.tracks,
                    self.audio.sample_rate,
                    self.audio.channels,
                    &self.audio.storage_path,
                );
                async move { result }
            })
            .await?;

        self.store
            .upsert_merged(sid, &merged)
            .await
            .map_err(|e| (Stage::Merge, StageError::Store(e.to_string())))?;
        self.checkpoint(cp, Stage::Merge).await?;
        Ok(merged)
    }

    async fn run_transcribe(
        &self,
        sid: Uuid,
        merged: &MergedAudio,
        cp: &mut PipelineCheckpoint,
    ) -> Result<Transcript, (Stage, StageError)> {
        if cp.is_done(Stage::Transcribe) {
            return self
                .load_bundle(sid, Stage::Transcribe)
                .await?
                .transcript
                .ok_or((Stage::Transcribe, missing_artifact("transcript")));
        }

        let transcript = self
            .retry(sid, Stage::Transcribe, || async {
                self.transcriber
                    .transcribe(merged)
                    .await
                    .map_err(StageError::from)
            })
            .await?;

        self.store
            .upsert_transcript(sid, &transcript)
            .await
            .map_err(|e| (Stage::Transcribe, StageError::Store(e.to_string())))?;
        self.checkpoint(cp, Stage::Transcribe).await?;
        Ok(transcript)
    }

    async fn run_analyze(
        &self,
        sid: Uuid,
        transcript: &Transcript,
        cp: &mut PipelineCheckpoint,
    ) -> Result<Analysis, (Stage, StageError)> {
        if cp.is_done(Stage::Analyze) {
            return self
                .load_bundle(sid, Stage::Analyze)
                .await?
                .analysis
                .ok_or((Stage::Analyze, missing_artifact("analysis")));
        }

        let analysis = self
            .retry(sid, Stage::Analyze, || async {
                match self.analyzer.analyze(transcript, false).await {
                    Err(ServiceError::Malformed(reason)) => {
                        // One corrective retry with the stricter instruction,
                        // then the stage fails for good.
                        warn!(
                            session_id = %sid,
                            reason = %reason,
                            "Malformed analysis response, retrying with strict instruction"
                        );
                        self.analyzer
                            .analyze(transcript, true)
                            .await
                            .map_err(StageError::from)
                    }
                    other => other.map_err(StageError::from),
                }
            })
            .await?;

        self.store
            .upsert_analysis(sid, &analysis)
            .await
            .map_err(|e| (Stage::Analyze, StageError::Store(e.to_string())))?;
        self.checkpoint(cp, Stage::Analyze).await?;
        Ok(analysis)
    }

    async fn run_persist(
        &self,
        sid: Uuid,
        merged: &MergedAudio,
        transcript: &Transcript,
        analysis: &Analysis,
        cp: &mut PipelineCheckpoint,
    ) -> Result<(), (Stage, StageError)> {
        if cp.is_done(Stage::Persist) {
            return Ok(());
        }

        self.retry(sid, Stage::Persist, || async {
            let mut session = self.load_session(sid).await?;

            match session.status {
                SessionStatus::Processing => {
                    session
                        .transition(SessionStatus::Completed, "complete", "pipeline")
                        .map_err(|e| StageError::Store(e.to_string()))?;
                }
                // Crash between save and checkpoint: already completed,
                // re-running the write is harmless.
                SessionStatus::Completed => {}
                other => {
                    return Err(StageError::Store(format!(
                        "unexpected session status {} at persist",
                        other
                    )))
                }
            }

            session.merged_audio_path = Some(merged.file_path.clone());
            session.transcription_cost_cents = Some(estimate_transcription_cost_cents(
                transcript.audio_duration_seconds,
            ));
            if let (Some(p), Some(c)) = (analysis.prompt_tokens, analysis.completion_tokens) {
                session.analysis_cost_cents = Some(estimate_analysis_cost_cents(p, c));
            }

            self.store
                .save(&session, transcript, analysis)
                .await
                .map_err(|e| StageError::Store(e.to_string()))
        })
        .await?;

        self.checkpoint(cp, Stage::Persist).await
    }

    /// Best-effort notification: bounded attempts, and a delivery failure is
    /// recorded on the session instead of failing the pipeline.
    async fn run_notify(
        &self,
        sid: Uuid,
        cp: &mut PipelineCheckpoint,
    ) -> Result<(), (Stage, StageError)> {
        if cp.is_done(Stage::Notify) {
            return Ok(());
        }

        let bundle = self.load_bundle(sid, Stage::Notify).await?;
        let report = render_report(&bundle);

        let outcome = self
            .retry(sid, Stage::Notify, || async {
                self.notifier
                    .notify(&bundle, &report)
                    .await
                    .map_err(StageError::from)
            })
            .await;

        if let Err((_, err)) = outcome {
            warn!(session_id = %sid, error = %err, "Completion notification failed");
            let mut session = bundle.session;
            session.notify_error = Some(err.to_string());
            if let Err(e) = self.store.upsert_session(&session).await {
                warn!(session_id = %sid, error = %e, "Failed to record notification error");
            }
        }

        self.checkpoint(cp, Stage::Notify).await
    }

    /// Bounded retry with exponential backoff. Only retryable (transient)
    /// errors are tried again; the attempt count includes the first try.
    async fn retry<T, F, Fut>(
        &self,
        sid: Uuid,
        stage: Stage,
        mut f: F,
    ) -> Result<T, (Stage, StageError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let max_attempts = self.pipeline.max_attempts(stage);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(session_id = %sid, stage = %stage, attempt, "Stage succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.pipeline.backoff_delay(attempt);
                    warn!(
                        session_id = %sid,
                        stage = %stage,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Stage attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        session_id = %sid,
                        stage = %stage,
                        attempt,
                        error = %err,
                        "Stage failed"
                    );
                    return Err((stage, err));
                }
            }
        }
    }

    async fn checkpoint(
        &self,
        cp: &mut PipelineCheckpoint,
        stage: Stage,
    ) -> Result<(), (Stage, StageError)> {
        cp.complete(stage);
        self.store
            .save_checkpoint(cp)
            .await
            .map_err(|e| (stage, StageError::Store(e.to_string())))
    }

    async fn load_bundle(
        &self,
        sid: Uuid,
        stage: Stage,
    ) -> Result<SessionBundle, (Stage, StageError)> {
        self.store
            .get(sid)
            .await
            .map_err(|e| (stage, StageError::Store(e.to_string())))?
            .ok_or((stage, StageError::Store(format!("session {} not found", sid))))
    }

    async fn load_session(&self, sid: Uuid) -> Result<Session, StageError> {
        self.store
            .get(sid)
            .await
            .map_err(|e| StageError::Store(e.to_string()))?
            .map(|b| b.session)
            .ok_or_else(|| StageError::Store(format!("session {} not found", sid)))
    }

    /// Record retry exhaustion: the session fails with the stage and last
    /// error kept for operator and user visibility. Never silently dropped.
    async fn mark_failed(&self, sid: Uuid, stage: Stage, err: &StageError) {
        error!(session_id = %sid, stage = %stage, error = %err, "Pipeline failed");

        let mut session = match self.load_session(sid).await {
            Ok(session) => session,
            Err(e) => {
                error!(session_id = %sid, error = %e, "Failed to load session for failure record");
                return;
            }
        };

        if session.status == SessionStatus::Processing {
            if let Err(e) = session.transition(SessionStatus::Failed, "fail", "pipeline") {
                error!(session_id = %sid, error = %e, "Failed to transition session to failed");
                return;
            }
        }
        session.failure = Some(SessionFailure {
            stage: stage.to_string(),
            reason: err.to_string(),
        });

        if let Err(e) = self.store.upsert_session(&session).await {
            error!(session_id = %sid, error = %e, "Failed to persist failure record");
        }
    }
}

fn missing_artifact(what: &str) -> StageError {
    StageError::Store(format!("checkpoint is ahead of stored {}", what))
}
