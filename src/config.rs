use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::Stage;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub pipeline: PipelineConfig,
    pub transcription: TranscriptionConfig,
    pub analysis: AnalysisConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "session-scribe".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8520,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Base directory for per-session audio artifacts
    pub storage_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./data/audio"),
            sample_rate: 48000,
            channels: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// A frame stamped past this duration forces an automatic stop
    pub max_session_duration_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_session_duration_secs: 4 * 3600,
        }
    }
}

/// Per-stage retry attempt counts plus shared exponential backoff parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub merge_attempts: u32,
    pub transcribe_attempts: u32,
    pub analyze_attempts: u32,
    pub persist_attempts: u32,
    /// Notify is best-effort: bounded attempts, failure never rolls back completion
    pub notify_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            merge_attempts: 2,
            transcribe_attempts: 3,
            analyze_attempts: 2,
            persist_attempts: 3,
            notify_attempts: 2,
            backoff_base_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

impl PipelineConfig {
    pub fn max_attempts(&self, stage: Stage) -> u32 {
        let attempts = match stage {
            Stage::Merge => self.merge_attempts,
            Stage::Transcribe => self.transcribe_attempts,
            Stage::Analyze => self.analyze_attempts,
            Stage::Persist => self.persist_attempts,
            Stage::Notify => self.notify_attempts,
        };
        attempts.max(1)
    }

    /// Delay before retry number `attempt` (1-based count of attempts made so far).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.backoff_base_ms as f64 * factor) as u64)
    }
}

/// Default recognition-boost vocabulary: tabletop terminology the
/// transcription service tends to miss in casual speech. Override per
/// campaign via the `transcription.vocabulary` config key.
const DEFAULT_VOCABULARY: &[&str] = &[
    // Core mechanics
    "hit points",
    "armor class",
    "spell slot",
    "saving throw",
    "skill check",
    "ability check",
    "attack roll",
    "damage roll",
    "initiative",
    "advantage",
    "disadvantage",
    "proficiency bonus",
    "bonus action",
    "reaction",
    "concentration",
    "short rest",
    "long rest",
    "death save",
    "critical hit",
    "natural 20",
    "natural 1",
    // Dice
    "d4",
    "d6",
    "d8",
    "d10",
    "d12",
    "d20",
    "d100",
    // Table talk
    "game master",
    "dungeon master",
    "player character",
    "non-player character",
    "NPC",
    "roll for initiative",
    "perception check",
    "insight check",
    "stealth check",
    "persuasion",
    "intimidation",
    "sleight of hand",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// Domain terms sent as recognition hints with every request
    pub vocabulary: Vec<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8910/v1/transcribe".to_string(),
            api_key: String::new(),
            timeout_secs: 600,
            vocabulary: DEFAULT_VOCABULARY.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Completion webhook for the originating channel; notifications are
    /// skipped entirely when unset
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
