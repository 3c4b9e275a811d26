use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use super::frame::{AudioFrame, SpeakerId};

/// Capture mode shared by all tracks in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureMode {
    /// Accepting frames (session recording)
    Open,
    /// Frames rejected and counted, buffered frames retained (session paused)
    Frozen,
    /// Permanently closed (session left recording/paused for good)
    Sealed,
}

/// Audio buffer for one identified speaker within a session.
///
/// Created lazily on the speaker's first frame; never more than one per
/// distinct speaker.
#[derive(Debug, Clone)]
pub struct SpeakerTrack {
    pub speaker: SpeakerId,
    frames: Vec<AudioFrame>,
}

impl SpeakerTrack {
    fn new(speaker: SpeakerId) -> Self {
        Self {
            speaker,
            frames: Vec::new(),
        }
    }

    fn push(&mut self, frame: AudioFrame) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Capture timestamp of the last audio in this track.
    pub fn end_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.end_ms()).max().unwrap_or(0)
    }

    /// Write the raw track to a WAV file (retained for diagnostics).
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let (sample_rate, channels) = match self.frames.first() {
            Some(f) => (f.sample_rate, f.channels),
            None => return Ok(()),
        };

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        for frame in &self.frames {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
        }

        writer.finalize().context("Failed to finalize WAV file")?;
        Ok(())
    }
}

/// The set of per-speaker capture buffers owned by one session.
///
/// Routing, pause/resume freezing and sealing all happen here; the session
/// manager serializes access through the per-session lock.
#[derive(Debug)]
pub struct TrackSet {
    tracks: HashMap<u64, SpeakerTrack>,
    mode: CaptureMode,
    dropped_frames: u64,
}

impl TrackSet {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            mode: CaptureMode::Open,
            dropped_frames: 0,
        }
    }

    /// Route a tagged frame to its speaker's track.
    ///
    /// Returns `true` if the frame was accepted. Frames arriving while the
    /// set is frozen or sealed are dropped and counted, never buffered.
    pub fn ingest(&mut self, speaker: &SpeakerId, frame: AudioFrame) -> bool {
        if self.mode != CaptureMode::Open {
            self.dropped_frames += 1;
            debug!(
                speaker = %speaker,
                timestamp_ms = frame.timestamp_ms,
                "Dropping frame outside recording state"
            );
            return false;
        }

        let track = self
            .tracks
            .entry(speaker.user_id)
            .or_insert_with(|| SpeakerTrack::new(speaker.clone()));
        track.push(frame);
        true
    }

    /// Stop accepting frames without sealing (pause).
    pub fn freeze(&mut self) {
        self.mode = CaptureMode::Frozen;
    }

    /// Accept frames again after a pause (resume).
    pub fn reopen(&mut self) {
        if self.mode == CaptureMode::Frozen {
            self.mode = CaptureMode::Open;
        }
    }

    /// Permanently close all tracks. No further writes are possible.
    pub fn seal(&mut self) {
        self.mode = CaptureMode::Sealed;
    }

    pub fn is_sealed(&self) -> bool {
        self.mode == CaptureMode::Sealed
    }

    /// Frames dropped while not recording, for observability.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn speaker_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn non_empty_count(&self) -> usize {
        self.tracks.values().filter(|t| !t.is_empty()).count()
    }

    /// Tracks in deterministic (user id) order.
    pub fn tracks_sorted(&self) -> Vec<&SpeakerTrack> {
        let mut tracks: Vec<&SpeakerTrack> = self.tracks.values().collect();
        tracks.sort_by_key(|t| t.speaker.user_id);
        tracks
    }

    /// Capture timestamp of the last audio across all tracks.
    pub fn end_ms(&self) -> u64 {
        self.tracks.values().map(|t| t.end_ms()).max().unwrap_or(0)
    }

    /// Write each non-empty track to `dir/speaker_<user_id>.wav`.
    ///
    /// Raw tracks are kept on disk so a failed merge can be diagnosed;
    /// write errors are logged, not fatal.
    pub fn write_speaker_wavs(&self, dir: &Path) {
        for track in self.tracks_sorted() {
            if track.is_empty() {
                continue;
            }
            let path = dir.join(format!("speaker_{}.wav", track.speaker.user_id));
            if let Err(e) = track.write_wav(&path) {
                warn!(speaker = %track.speaker, error = %e, "Failed to write speaker track");
            }
        }
    }
}

impl Default for TrackSet {
    fn default() -> Self {
        Self::new()
    }
}
