use serde::{Deserialize, Serialize};

/// Identity of one participant in the voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpeakerId {
    /// Platform user id (stable across sessions)
    pub user_id: u64,
    /// Display name at capture time, used as the diarization label
    pub display_name: String,
}

impl SpeakerId {
    pub fn new(user_id: u64, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

impl std::fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.user_id)
    }
}

/// Audio sample data (16-bit PCM, interleaved).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Capture timestamp in milliseconds since session start. Alignment at
    /// merge time uses this, not arrival order.
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Capture timestamp of the end of this frame.
    pub fn end_ms(&self) -> u64 {
        self.timestamp_ms + self.duration_ms()
    }
}
