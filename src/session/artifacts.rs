use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One speaker-labeled span of the diarized transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub confidence: Option<f32>,
}

/// The diarized transcript of a session. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: Uuid,
    /// Utterances ordered by start time
    pub utterances: Vec<Utterance>,
    pub audio_duration_seconds: f64,
    pub average_confidence: Option<f32>,
    pub language: Option<String>,
}

impl Transcript {
    /// Distinct speakers attributed in the transcript.
    pub fn speaker_count(&self) -> usize {
        let mut speakers: Vec<&str> = self.utterances.iter().map(|u| u.speaker.as_str()).collect();
        speakers.sort_unstable();
        speakers.dedup();
        speakers.len()
    }

    /// "Speaker: text" lines, the shape the analysis prompt expects.
    pub fn speaker_labeled_text(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("{}: {}", u.speaker, u.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A named entity extracted from the transcript (NPC or location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One noteworthy event, in narrative order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeEvent {
    pub order: u32,
    pub description: String,
}

/// Structured extraction derived from the transcript. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub session_id: Uuid,
    pub summary: String,
    pub npcs: Vec<NamedEntity>,
    pub locations: Vec<NamedEntity>,
    pub events: Vec<NarrativeEvent>,
    pub model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(speaker: &str, text: &str) -> Utterance {
        Utterance {
            speaker: speaker.to_string(),
            start_ms: 0,
            end_ms: 1000,
            text: text.to_string(),
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_speaker_count_distinct() {
        let transcript = Transcript {
            session_id: Uuid::new_v4(),
            utterances: vec![
                utterance("Alice", "I open the door"),
                utterance("Bob", "Roll for initiative"),
                utterance("Alice", "Again?"),
            ],
            audio_duration_seconds: 3.0,
            average_confidence: None,
            language: None,
        };
        assert_eq!(transcript.speaker_count(), 2);
    }

    #[test]
    fn test_speaker_labeled_text() {
        let transcript = Transcript {
            session_id: Uuid::new_v4(),
            utterances: vec![utterance("Alice", "Hello"), utterance("Bob", "Hi")],
            audio_duration_seconds: 2.0,
            average_confidence: None,
            language: None,
        };
        assert_eq!(transcript.speaker_labeled_text(), "Alice: Hello\nBob: Hi");
    }
}
