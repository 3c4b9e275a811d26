use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::audio::{MergedAudio, SpeakerInterval};
use crate::config::TranscriptionConfig;
use crate::error::ServiceError;
use crate::session::{Transcript, Utterance};

/// Speech-to-text boundary. Input is the merged audio artifact with its
/// diarization hints; output is a diarized transcript or a classified error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &MergedAudio) -> Result<Transcript, ServiceError>;
}

// The boost field is size-limited on the service side; send the head of
// the configured list.
const MAX_BOOST_TERMS: usize = 100;

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    session_id: String,
    audio_path: String,
    sample_rate: u32,
    channels: u16,
    /// Who spoke when, so diarization can label utterances with real names
    speaker_hints: Vec<SpeakerHint<'a>>,
    /// Domain terms boosted in recognition
    word_boost: &'a [String],
    punctuate: bool,
    format_text: bool,
}

#[derive(Debug, Serialize)]
struct SpeakerHint<'a> {
    speaker: &'a str,
    start_ms: u64,
    end_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    utterances: Vec<UtteranceDto>,
    audio_duration_seconds: Option<f64>,
    confidence: Option<f32>,
    language: Option<String>,
    /// Set when the service rejected the audio (unsupported/corrupt input)
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UtteranceDto {
    speaker: String,
    text: String,
    start_ms: u64,
    end_ms: u64,
    confidence: Option<f32>,
}

/// HTTP client for the transcription service.
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
    api_key: String,
    vocabulary: Vec<String>,
}

impl HttpTranscriber {
    pub fn new(cfg: &TranscriptionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
            vocabulary: cfg
                .vocabulary
                .iter()
                .take(MAX_BOOST_TERMS)
                .cloned()
                .collect(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &MergedAudio) -> Result<Transcript, ServiceError> {
        let request = TranscribeRequest {
            session_id: audio.session_id.to_string(),
            audio_path: audio.file_path.display().to_string(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            speaker_hints: audio
                .speaker_map
                .iter()
                .map(|i: &SpeakerInterval| SpeakerHint {
                    speaker: &i.speaker.display_name,
                    start_ms: i.start_ms,
                    end_ms: i.end_ms,
                })
                .collect(),
            word_boost: &self.vocabulary,
            punctuate: true,
            format_text: true,
        };

        info!(
            session_id = %audio.session_id,
            duration_ms = audio.duration_ms,
            hints = request.speaker_hints.len(),
            boost_terms = request.word_boost.len(),
            "Requesting transcription"
        );

        let response = self
            .client
            .post(&self.url)
            .header("authorization", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(super::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(super::classify_status(status, &body));
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Permanent(format!("unparseable transcription response: {}", e)))?;

        if let Some(error) = body.error {
            // The service accepted the request but rejected the audio itself
            return Err(ServiceError::Permanent(error));
        }

        let mut utterances: Vec<Utterance> = body
            .utterances
            .into_iter()
            .map(|u| Utterance {
                speaker: u.speaker,
                start_ms: u.start_ms,
                end_ms: u.end_ms,
                text: u.text,
                confidence: u.confidence,
            })
            .collect();
        utterances.sort_by_key(|u| u.start_ms);

        let average_confidence = body.confidence.or_else(|| {
            let known: Vec<f32> = utterances.iter().filter_map(|u| u.confidence).collect();
            if known.is_empty() {
                None
            } else {
                Some(known.iter().sum::<f32>() / known.len() as f32)
            }
        });

        info!(
            session_id = %audio.session_id,
            utterances = utterances.len(),
            language = ?body.language,
            "Transcription completed"
        );

        Ok(Transcript {
            session_id: audio.session_id,
            utterances,
            audio_duration_seconds: body
                .audio_duration_seconds
                .unwrap_or(audio.duration_ms as f64 / 1000.0),
            average_confidence,
            language: body.language,
        })
    }
}

/// Transcription pricing: $0.15/hour, i.e. 0.25 cents per minute.
pub fn estimate_transcription_cost_cents(duration_seconds: f64) -> u32 {
    (duration_seconds / 60.0 * 0.25).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_estimate() {
        assert_eq!(estimate_transcription_cost_cents(0.0), 0);
        // 4 hours of audio = 240 minutes = 60 cents
        assert_eq!(estimate_transcription_cost_cents(4.0 * 3600.0), 60);
    }

    #[test]
    fn test_request_serializes_vocabulary_boost() {
        let vocabulary = vec!["saving throw".to_string(), "d20".to_string()];
        let request = TranscribeRequest {
            session_id: "s".into(),
            audio_path: "/tmp/merged.wav".into(),
            sample_rate: 48000,
            channels: 1,
            speaker_hints: vec![],
            word_boost: &vocabulary,
            punctuate: true,
            format_text: true,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["word_boost"],
            serde_json::json!(["saving throw", "d20"])
        );
    }

    #[test]
    fn test_default_vocabulary_reaches_the_request() {
        let transcriber = HttpTranscriber::new(&TranscriptionConfig::default()).unwrap();
        assert!(transcriber
            .vocabulary
            .iter()
            .any(|t| t == "roll for initiative"));
    }

    #[test]
    fn test_boost_list_is_capped() {
        let cfg = TranscriptionConfig {
            vocabulary: (0..250).map(|i| format!("term-{}", i)).collect(),
            ..Default::default()
        };
        let transcriber = HttpTranscriber::new(&cfg).unwrap();
        assert_eq!(transcriber.vocabulary.len(), MAX_BOOST_TERMS);
    }
}
