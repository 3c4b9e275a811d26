// Merge stage: combine sealed per-speaker tracks into one mixed waveform.
//
// All tracks are aligned on the common session-relative timeline using
// frame capture timestamps, summed with clipping, and written out as a
// single WAV file. Alongside the waveform we keep a per-interval speaker
// map so the transcription service can be hinted about who spoke when.
//
// The merge is deterministic: tracks are processed in speaker id order and
// nothing here depends on wall-clock time, so a retried merge produces an
// identical artifact.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StageError;

use super::frame::SpeakerId;
use super::track::TrackSet;

/// A contiguous span of the merged timeline attributed to one speaker.
/// Spans from different speakers may overlap (simultaneous speech).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInterval {
    pub speaker: SpeakerId,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// The single merged audio artifact for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedAudio {
    pub session_id: Uuid,
    /// Mixed waveform on disk (16-bit PCM WAV)
    pub file_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
    /// Diarization hints, ordered by start time then speaker id
    pub speaker_map: Vec<SpeakerInterval>,
}

/// Merge the sealed track set of a stopped session into one `MergedAudio`.
///
/// Tracks with zero frames are dropped (the speaker never spoke); a session
/// with no non-empty tracks fails with `EmptySession`.
pub fn merge_tracks(
    session_id: Uuid,
    tracks: &TrackSet,
    sample_rate: u32,
    channels: u16,
    output_dir: &Path,
) -> Result<MergedAudio, StageError> {
    let speaking: Vec<_> = tracks
        .tracks_sorted()
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect();

    if speaking.is_empty() {
        return Err(StageError::EmptySession);
    }

    let duration_ms = tracks.end_ms();
    let total_samples = (duration_ms * sample_rate as u64 / 1000) as usize * channels as usize;
    let mut mix = vec![0i32; total_samples];
    let mut speaker_map = Vec::new();

    for track in &speaking {
        let mut spans: Vec<(u64, u64)> = Vec::new();

        let mut frames: Vec<_> = track.frames().iter().collect();
        frames.sort_by_key(|f| f.timestamp_ms);

        for frame in frames {
            if frame.sample_rate != sample_rate || frame.channels != channels {
                warn!(
                    speaker = %track.speaker,
                    expected = sample_rate,
                    got = frame.sample_rate,
                    "Frame format mismatch, dropping from merge"
                );
                continue;
            }

            // Sum into the mix buffer at the frame's timeline offset
            let offset =
                (frame.timestamp_ms * sample_rate as u64 / 1000) as usize * channels as usize;
            for (i, &sample) in frame.samples.iter().enumerate() {
                if let Some(slot) = mix.get_mut(offset + i) {
                    *slot += sample as i32;
                }
            }

            // Extend or open this speaker's current span
            match spans.last_mut() {
                Some((_, end)) if frame.timestamp_ms <= *end => {
                    *end = (*end).max(frame.end_ms());
                }
                _ => spans.push((frame.timestamp_ms, frame.end_ms())),
            }
        }

        for (start_ms, end_ms) in spans {
            speaker_map.push(SpeakerInterval {
                speaker: track.speaker.clone(),
                start_ms,
                end_ms,
            });
        }
    }

    speaker_map.sort_by_key(|i| (i.start_ms, i.speaker.user_id));

    // Clip to prevent overflow
    let samples: Vec<i16> = mix
        .into_iter()
        .map(|s| s.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect();

    let file_path = write_merged_wav(session_id, &samples, sample_rate, channels, output_dir)?;

    info!(
        session_id = %session_id,
        speakers = speaking.len(),
        duration_ms,
        intervals = speaker_map.len(),
        "Merged speaker tracks"
    );

    Ok(MergedAudio {
        session_id,
        file_path,
        sample_rate,
        channels,
        duration_ms,
        speaker_map,
    })
}

fn write_merged_wav(
    session_id: Uuid,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
    output_dir: &Path,
) -> Result<PathBuf, StageError> {
    let session_dir = output_dir.join(session_id.to_string());
    fs::create_dir_all(&session_dir)
        .map_err(|e| StageError::Audio(format!("failed to create {:?}: {}", session_dir, e)))?;

    let path = session_dir.join("merged.wav");
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)
        .map_err(|e| StageError::Audio(format!("failed to create {:?}: {}", path, e)))?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| StageError::Audio(format!("failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| StageError::Audio(format!("failed to finalize WAV: {}", e)))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::AudioFrame;
    use tempfile::TempDir;

    const RATE: u32 = 1000; // 1 sample per ms keeps offsets easy to reason about

    fn frame(timestamp_ms: u64, samples: Vec<i16>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: RATE,
            channels: 1,
            timestamp_ms,
        }
    }

    fn read_samples(path: &Path) -> Vec<i16> {
        hound::WavReader::open(path)
            .unwrap()
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_merge_empty_session() {
        let tmp = TempDir::new().unwrap();
        let mut tracks = TrackSet::new();
        tracks.seal();

        let err = merge_tracks(Uuid::new_v4(), &tracks, RATE, 1, tmp.path()).unwrap_err();
        assert!(matches!(err, StageError::EmptySession));
    }

    #[test]
    fn test_merge_sums_overlapping_speech_with_clipping() {
        let tmp = TempDir::new().unwrap();
        let mut tracks = TrackSet::new();
        tracks.ingest(&SpeakerId::new(1, "Alice"), frame(0, vec![100, 200, i16::MAX - 50]));
        tracks.ingest(&SpeakerId::new(2, "Bob"), frame(0, vec![50, 100, 200]));
        tracks.seal();

        let merged = merge_tracks(Uuid::new_v4(), &tracks, RATE, 1, tmp.path()).unwrap();
        let samples = read_samples(&merged.file_path);

        assert_eq!(samples[0], 150);
        assert_eq!(samples[1], 300);
        assert_eq!(samples[2], i16::MAX); // clipped
        assert_eq!(merged.duration_ms, 3);
    }

    #[test]
    fn test_merge_aligns_by_timestamp() {
        let tmp = TempDir::new().unwrap();
        let mut tracks = TrackSet::new();
        tracks.ingest(&SpeakerId::new(1, "Alice"), frame(0, vec![10, 10]));
        tracks.ingest(&SpeakerId::new(2, "Bob"), frame(4, vec![20, 20]));
        tracks.seal();

        let merged = merge_tracks(Uuid::new_v4(), &tracks, RATE, 1, tmp.path()).unwrap();
        let samples = read_samples(&merged.file_path);

        // silence between the two utterances
        assert_eq!(samples, vec![10, 10, 0, 0, 20, 20]);
        assert_eq!(merged.duration_ms, 6);
    }

    #[test]
    fn test_speaker_map_coalesces_contiguous_frames() {
        let tmp = TempDir::new().unwrap();
        let mut tracks = TrackSet::new();
        let alice = SpeakerId::new(1, "Alice");

        // two contiguous frames, then a gap, then another frame
        tracks.ingest(&alice, frame(0, vec![1, 1]));
        tracks.ingest(&alice, frame(2, vec![1, 1]));
        tracks.ingest(&alice, frame(10, vec![1, 1]));
        tracks.seal();

        let merged = merge_tracks(Uuid::new_v4(), &tracks, RATE, 1, tmp.path()).unwrap();

        assert_eq!(
            merged.speaker_map,
            vec![
                SpeakerInterval {
                    speaker: alice.clone(),
                    start_ms: 0,
                    end_ms: 4
                },
                SpeakerInterval {
                    speaker: alice,
                    start_ms: 10,
                    end_ms: 12
                },
            ]
        );
    }

    #[test]
    fn test_merge_drops_silent_speakers() {
        let tmp = TempDir::new().unwrap();
        let mut tracks = TrackSet::new();
        tracks.ingest(&SpeakerId::new(1, "Alice"), frame(0, vec![5, 5]));
        // Bob joins the channel but never speaks: the track only exists if a
        // frame arrives, so simply never ingest for him.
        tracks.seal();

        let merged = merge_tracks(Uuid::new_v4(), &tracks, RATE, 1, tmp.path()).unwrap();
        let speakers: Vec<u64> = merged
            .speaker_map
            .iter()
            .map(|i| i.speaker.user_id)
            .collect();
        assert_eq!(speakers, vec![1]);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let mut tracks = TrackSet::new();
        tracks.ingest(&SpeakerId::new(7, "Bob"), frame(3, vec![40, 40, 40]));
        tracks.ingest(&SpeakerId::new(3, "Alice"), frame(0, vec![10, 10]));
        tracks.ingest(&SpeakerId::new(3, "Alice"), frame(5, vec![10]));
        tracks.seal();

        let id = Uuid::new_v4();
        let first = merge_tracks(id, &tracks, RATE, 1, tmp.path()).unwrap();
        let first_samples = read_samples(&first.file_path);
        let second = merge_tracks(id, &tracks, RATE, 1, tmp.path()).unwrap();
        let second_samples = read_samples(&second.file_path);

        assert_eq!(first.speaker_map, second.speaker_map);
        assert_eq!(first.duration_ms, second.duration_ms);
        assert_eq!(first_samples, second_samples);
    }
}
