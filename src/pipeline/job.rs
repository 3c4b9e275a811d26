use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::TrackSet;

/// The ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Merge,
    Transcribe,
    Analyze,
    Persist,
    Notify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Merge => "merge",
            Stage::Transcribe => "transcribe",
            Stage::Analyze => "analyze",
            Stage::Persist => "persist",
            Stage::Notify => "notify",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One enqueued unit of pipeline work: the session id plus its sealed
/// capture buffers.
#[derive(Debug)]
pub struct PipelineJob {
    pub session_id: Uuid,
    pub tracks: TrackSet,
}

/// Durable record of pipeline progress, written after each stage's artifact
/// is stored. Re-running a job skips everything at or before `completed`,
/// so a crash re-executes at most the one interrupted stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    pub session_id: Uuid,
    /// Last durably completed stage, if any
    pub completed: Option<Stage>,
}

impl PipelineCheckpoint {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            completed: None,
        }
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.completed.map_or(false, |done| done >= stage)
    }

    pub fn complete(&mut self, stage: Stage) {
        debug_assert!(self.completed.map_or(true, |done| stage > done));
        self.completed = Some(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Merge < Stage::Transcribe);
        assert!(Stage::Transcribe < Stage::Analyze);
        assert!(Stage::Analyze < Stage::Persist);
        assert!(Stage::Persist < Stage::Notify);
    }

    #[test]
    fn test_checkpoint_progress() {
        let mut cp = PipelineCheckpoint::new(Uuid::new_v4());
        assert!(!cp.is_done(Stage::Merge));

        cp.complete(Stage::Merge);
        assert!(cp.is_done(Stage::Merge));
        assert!(!cp.is_done(Stage::Transcribe));

        cp.complete(Stage::Transcribe);
        assert!(cp.is_done(Stage::Merge));
        assert!(cp.is_done(Stage::Transcribe));
        assert!(!cp.is_done(Stage::Persist));
    }
}
