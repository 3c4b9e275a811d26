pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod session;
pub mod store;

pub use audio::{merge_tracks, AudioFrame, MergedAudio, SpeakerId, SpeakerInterval, TrackSet};
pub use config::Config;
pub use error::{CommandError, ServiceError, StageError};
pub use http::{create_router, AppState};
pub use notify::{Notifier, WebhookNotifier};
pub use pipeline::{PipelineJob, PipelineWorker, Stage};
pub use services::{Analyzer, HttpAnalyzer, HttpTranscriber, Transcriber};
pub use session::{Session, SessionManager, SessionStatus, SessionStatusView};
pub use store::{MemoryStore, SessionBundle, SessionFilter, SessionStore};
