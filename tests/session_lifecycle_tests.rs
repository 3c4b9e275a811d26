// Integration tests for the session state machine and manager:
// start/pause/resume/stop commands, frame routing, the duration limit
// and the empty-session short circuit.

use session_scribe::config::{AudioConfig, RecordingConfig};
use session_scribe::{
    AudioFrame, CommandError, MemoryStore, PipelineJob, SessionManager, SessionStatus, SpeakerId,
};
use std::sync::Arc;
use tokio::sync::mpsc;

fn frame(timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![100i16; 480],
        sample_rate: 48000,
        channels: 1,
        timestamp_ms,
    }
}

struct Harness {
    manager: SessionManager,
    store: Arc<MemoryStore>,
    jobs: mpsc::Receiver<PipelineJob>,
    _dir: tempfile::TempDir,
}

fn harness(max_session_duration_secs: u64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let (queue, jobs) = mpsc::channel(8);

    let manager = SessionManager::new(
        store.clone(),
        queue,
        AudioConfig {
            storage_path: dir.path().to_path_buf(),
            sample_rate: 48000,
            channels: 1,
        },
        RecordingConfig {
            max_session_duration_secs,
        },
    );

    Harness {
        manager,
        store,
        jobs,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_stop_enqueues_pipeline_job() {
    let mut h = harness(3600);
    let alice = SpeakerId::new(1, "Alice");
    let bob = SpeakerId::new(2, "Bob");

    let session = h.manager.start(42, Some("Tavern Brawl".into())).await.unwrap();
    assert_eq!(session.status, SessionStatus::Recording);

    h.manager.ingest_frame(42, &alice, frame(0)).await.unwrap();
    h.manager.ingest_frame(42, &bob, frame(10)).await.unwrap();

    let stopped = h.manager.stop(42).await.unwrap();
    assert_eq!(stopped.status, SessionStatus::Processing);
    assert!(stopped.ended_at.is_some());

    let job = h.jobs.try_recv().unwrap();
    assert_eq!(job.session_id, session.id);
    assert_eq!(job.tracks.speaker_count(), 2);
}

#[tokio::test]
async fn test_start_twice_is_conflict() {
    let h = harness(3600);

    h.manager.start(42, None).await.unwrap();
    let err = h.manager.start(42, None).await.unwrap_err();
    assert!(matches!(err, CommandError::AlreadyRecording));

    // A different voice context is unaffected
    h.manager.start(43, None).await.unwrap();
}

#[tokio::test]
async fn test_pause_drops_frames_and_resume_accepts_again() {
    let mut h = harness(3600);
    let alice = SpeakerId::new(1, "Alice");

    h.manager.start(42, None).await.unwrap();
    h.manager.ingest_frame(42, &alice, frame(0)).await.unwrap();

    let paused = h.manager.pause(42).await.unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);

    // Frames during the pause are dropped and counted, not buffered
    h.manager.ingest_frame(42, &alice, frame(10)).await.unwrap();
    h.manager.ingest_frame(42, &alice, frame(20)).await.unwrap();

    let view = h.manager.status(42).await.unwrap().unwrap();
    assert_eq!(view.status, SessionStatus::Paused);
    assert_eq!(view.dropped_frames, 2);

    let resumed = h.manager.resume(42).await.unwrap();
    assert_eq!(resumed.status, SessionStatus::Recording);
    h.manager.ingest_frame(42, &alice, frame(30)).await.unwrap();

    h.manager.stop(42).await.unwrap();
    let job = h.jobs.try_recv().unwrap();
    // Only the pre-pause and post-resume frames survive
    assert_eq!(job.tracks.tracks_sorted()[0].frames().len(), 2);
}

#[tokio::test]
async fn test_commands_without_session_are_invalid_state() {
    let h = harness(3600);

    for result in [
        h.manager.stop(42).await,
        h.manager.pause(42).await,
        h.manager.resume(42).await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            CommandError::InvalidState { state: "idle", .. }
        ));
    }
}

#[tokio::test]
async fn test_pause_while_paused_is_invalid_state() {
    let h = harness(3600);

    h.manager.start(42, None).await.unwrap();
    h.manager.pause(42).await.unwrap();

    let err = h.manager.pause(42).await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::InvalidState {
            action: "pause",
            state: "paused"
        }
    ));

    // Resume still works; the failed command changed nothing
    h.manager.resume(42).await.unwrap();
}

#[tokio::test]
async fn test_empty_session_fails_at_stop() {
    let mut h = harness(3600);

    let session = h.manager.start(42, None).await.unwrap();
    let stopped = h.manager.stop(42).await.unwrap();

    assert_eq!(stopped.status, SessionStatus::Failed);
    let failure = stopped.failure.unwrap();
    assert_eq!(failure.stage, "stop");
    assert!(failure.reason.contains("no audio"));

    // Never reaches processing, so no pipeline job
    assert!(h.jobs.try_recv().is_err());

    // The failed session is still queryable
    let view = h.manager.status(42).await.unwrap().unwrap();
    assert_eq!(view.session_id, session.id);
    assert_eq!(view.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_duration_limit_forces_stop() {
    let mut h = harness(1); // 1 second limit
    let alice = SpeakerId::new(1, "Alice");

    h.manager.start(42, None).await.unwrap();
    h.manager.ingest_frame(42, &alice, frame(0)).await.unwrap();

    // This frame is stamped past the limit: it forces the stop and is
    // itself dropped
    h.manager.ingest_frame(42, &alice, frame(1500)).await.unwrap();

    let view = h.manager.status(42).await.unwrap().unwrap();
    assert_eq!(view.status, SessionStatus::Processing);
    assert_eq!(view.dropped_frames, 1);

    let job = h.jobs.try_recv().unwrap();
    assert_eq!(job.tracks.tracks_sorted()[0].frames().len(), 1);

    // The context is idle again; later frames are ignored
    h.manager.ingest_frame(42, &alice, frame(2000)).await.unwrap();
    assert!(h.jobs.try_recv().is_err());
}

#[tokio::test]
async fn test_forced_stop_with_no_audio_counts_frame_before_failing() {
    let mut h = harness(1);
    let alice = SpeakerId::new(1, "Alice");

    h.manager.start(42, None).await.unwrap();
    // The only frame ever seen is already past the limit: the session is
    // force-stopped empty, the frame dropped and counted
    h.manager.ingest_frame(42, &alice, frame(1500)).await.unwrap();

    let view = h.manager.status(42).await.unwrap().unwrap();
    assert_eq!(view.status, SessionStatus::Failed);
    assert_eq!(view.dropped_frames, 1);
    assert_eq!(view.failure.unwrap().stage, "stop");
    assert!(h.jobs.try_recv().is_err());

    // The stored record is final: the count is in it and nothing follows
    // the failing transition
    use session_scribe::{SessionFilter, SessionStore};
    let stored = h.store.list(&SessionFilter::default(), 1).await.unwrap();
    assert_eq!(stored[0].dropped_frames, 1);
    assert_eq!(
        stored[0].audit_trail.last().unwrap().to,
        SessionStatus::Failed
    );
}

#[tokio::test]
async fn test_frames_for_idle_context_are_ignored() {
    let h = harness(3600);
    let alice = SpeakerId::new(1, "Alice");

    // No session anywhere: ingestion is a silent no-op
    h.manager.ingest_frame(42, &alice, frame(0)).await.unwrap();
    assert!(h.manager.status(42).await.unwrap().is_none());
}

#[tokio::test]
async fn test_audit_trail_records_every_transition() {
    let h = harness(3600);
    let alice = SpeakerId::new(1, "Alice");

    h.manager.start(42, None).await.unwrap();
    h.manager.ingest_frame(42, &alice, frame(0)).await.unwrap();
    h.manager.pause(42).await.unwrap();
    h.manager.resume(42).await.unwrap();
    let stopped = h.manager.stop(42).await.unwrap();

    let statuses: Vec<SessionStatus> =
        stopped.audit_trail.iter().map(|e| e.to).collect();
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Recording,
            SessionStatus::Paused,
            SessionStatus::Recording,
            SessionStatus::Stopped,
            SessionStatus::Processing,
        ]
    );

    // Each event's `from` links to the previous event's `to`
    for pair in stopped.audit_trail.windows(2) {
        assert_eq!(pair[1].from, Some(pair[0].to));
    }

    use session_scribe::{SessionFilter, SessionStore};
    let stored = h
        .store
        .list(&SessionFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].audit_trail.len(), stopped.audit_trail.len());
}
