//! Audio capture and merge
//!
//! This module provides:
//! - `AudioFrame` / `SpeakerId`: tagged PCM frames arriving from the capture side
//! - `SpeakerTrack` / `TrackSet`: per-speaker capture buffers for one session
//! - `merge_tracks`: the deterministic merge stage producing a single mixed
//!   waveform plus a speaker interval map for diarization hinting

pub mod frame;
pub mod merge;
pub mod track;

pub use frame::{AudioFrame, SpeakerId};
pub use merge::{merge_tracks, MergedAudio, SpeakerInterval};
pub use track::{SpeakerTrack, TrackSet};
