use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::error::ServiceError;
use crate::session::{Analysis, NamedEntity, NarrativeEvent, Transcript};

const SYSTEM_PROMPT: &str = "You are a tabletop session analyst. Your job is to read session \
transcripts and extract structured information.\n\n\
You will receive a transcript with speaker labels, where one speaker is \
typically the game master describing scenes and others are players.\n\n\
Respond ONLY with valid JSON matching the schema provided. Do not include \
any text outside the JSON.";

/// Appended for the single corrective retry after a malformed response.
const STRICT_SUFFIX: &str = "\n\nIMPORTANT: your previous response could not be parsed. Respond \
with a single JSON object and nothing else: no prose, no markdown fences, \
no comments. Every key in the schema must be present, using an empty array \
when nothing was found.";

// Very long transcripts are truncated to stay inside the model context.
const MAX_TRANSCRIPT_CHARS: usize = 500_000;

fn user_prompt(transcript: &str, strict: bool) -> String {
    let mut transcript = transcript;
    let truncated;
    if transcript.len() > MAX_TRANSCRIPT_CHARS {
        let mut cut = MAX_TRANSCRIPT_CHARS;
        while !transcript.is_char_boundary(cut) {
            cut -= 1;
        }
        truncated = format!("{}\n\n[Transcript truncated due to length]", &transcript[..cut]);
        transcript = &truncated;
    }

    let mut prompt = format!(
        "## Session Transcript\n{transcript}\n\n\
## Task\n\
Analyze this session transcript and extract:\n\
1. **Summary**: a narrative overview of the session\n\
2. **NPCs**: characters that appeared or were mentioned\n\
3. **Locations**: places visited or referenced\n\
4. **Events**: major plot points, discoveries and decisions, in order\n\n\
## Response Schema\n\
```json\n\
{{\n\
  \"summary\": \"narrative overview\",\n\
  \"npcs\": [{{\"name\": \"NPC name\", \"description\": \"brief description\"}}],\n\
  \"locations\": [{{\"name\": \"location name\", \"description\": \"brief description\"}}],\n\
  \"events\": [{{\"order\": 1, \"description\": \"what happened\"}}]\n\
}}\n\
```\n\n\
Respond with ONLY the JSON, no additional text."
    );

    if strict {
        prompt.push_str(STRICT_SUFFIX);
    }
    prompt
}

/// Language-model boundary. `strict` selects the tightened instruction used
/// for the one corrective retry after a malformed response.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, transcript: &Transcript, strict: bool)
        -> Result<Analysis, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// The extraction payload the model must return. Every field is required;
/// a missing category is a malformed response, an empty one is fine.
#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    summary: String,
    npcs: Vec<NamedEntity>,
    locations: Vec<NamedEntity>,
    events: Vec<EventDto>,
}

#[derive(Debug, Deserialize)]
struct EventDto {
    order: Option<u32>,
    description: String,
}

/// HTTP client for the language-model service (messages-style API).
pub struct HttpAnalyzer {
    client: reqwest::Client,
    cfg: AnalysisConfig,
}

impl HttpAnalyzer {
    pub fn new(cfg: &AnalysisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            cfg: cfg.clone(),
        })
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        transcript: &Transcript,
        strict: bool,
    ) -> Result<Analysis, ServiceError> {
        let text = transcript.speaker_labeled_text();

        info!(
            session_id = %transcript.session_id,
            transcript_chars = text.len(),
            strict,
            "Requesting transcript analysis"
        );

        let request = json!({
            "model": self.cfg.model,
            "max_tokens": self.cfg.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": user_prompt(&text, strict) }],
        });

        let response = self
            .client
            .post(&self.cfg.url)
            .header("x-api-key", &self.cfg.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(super::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(super::classify_status(status, &body));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(format!("unparseable message envelope: {}", e)))?;

        let content = message
            .content
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default();

        let payload = parse_extraction(content)?;

        info!(
            session_id = %transcript.session_id,
            npcs = payload.npcs.len(),
            locations = payload.locations.len(),
            events = payload.events.len(),
            "Analysis completed"
        );

        Ok(Analysis {
            session_id: transcript.session_id,
            summary: payload.summary,
            npcs: dedup_entities(payload.npcs),
            locations: dedup_entities(payload.locations),
            events: payload
                .events
                .into_iter()
                .enumerate()
                .map(|(i, e)| NarrativeEvent {
                    order: e.order.unwrap_or(i as u32 + 1),
                    description: e.description,
                })
                .collect(),
            model: message.model,
            prompt_tokens: message.usage.as_ref().map(|u| u.input_tokens),
            completion_tokens: message.usage.as_ref().map(|u| u.output_tokens),
        })
    }
}

/// Parse the model's text into the extraction payload, salvaging a JSON
/// object embedded in surrounding prose if needed.
fn parse_extraction(content: &str) -> Result<ExtractionPayload, ServiceError> {
    match serde_json::from_str(content) {
        Ok(payload) => Ok(payload),
        Err(first_err) => {
            let start = content.find('{');
            let end = content.rfind('}');
            if let (Some(start), Some(end)) = (start, end) {
                if start < end {
                    if let Ok(payload) = serde_json::from_str(&content[start..=end]) {
                        warn!("Salvaged JSON object from non-JSON analysis response");
                        return Ok(payload);
                    }
                }
            }
            Err(ServiceError::Malformed(first_err.to_string()))
        }
    }
}

/// Entity categories are sets: drop duplicate names, first occurrence wins.
fn dedup_entities(entities: Vec<NamedEntity>) -> Vec<NamedEntity> {
    let mut seen = std::collections::HashSet::new();
    entities
        .into_iter()
        .filter(|e| seen.insert(e.name.to_lowercase()))
        .collect()
}

/// Model pricing: $3/M input tokens, $15/M output tokens.
pub fn estimate_analysis_cost_cents(prompt_tokens: u32, completion_tokens: u32) -> u32 {
    let input = prompt_tokens as f64 / 1_000_000.0 * 300.0;
    let output = completion_tokens as f64 / 1_000_000.0 * 1500.0;
    (input + output).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_plain_json() {
        let payload = parse_extraction(
            r#"{"summary": "The party met a dragon.", "npcs": [], "locations": [], "events": []}"#,
        )
        .unwrap();
        assert_eq!(payload.summary, "The party met a dragon.");
        assert!(payload.npcs.is_empty());
    }

    #[test]
    fn test_parse_extraction_salvages_embedded_json() {
        let content = "Here is the analysis:\n```json\n{\"summary\": \"s\", \"npcs\": [], \
                       \"locations\": [], \"events\": [{\"order\": 1, \"description\": \"d\"}]}\n```";
        let payload = parse_extraction(content).unwrap();
        assert_eq!(payload.events.len(), 1);
    }

    #[test]
    fn test_parse_extraction_missing_category_is_malformed() {
        // locations key absent entirely
        let err =
            parse_extraction(r#"{"summary": "s", "npcs": [], "events": []}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn test_parse_extraction_prose_is_malformed() {
        let err = parse_extraction("The session was about a tavern brawl.").unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn test_dedup_entities_case_insensitive() {
        let entities = vec![
            NamedEntity {
                name: "Grog".into(),
                description: "a barbarian".into(),
            },
            NamedEntity {
                name: "grog".into(),
                description: "duplicate".into(),
            },
        ];
        let deduped = dedup_entities(entities);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].description, "a barbarian");
    }

    #[test]
    fn test_strict_prompt_appends_corrective_instruction() {
        let relaxed = user_prompt("Alice: hi", false);
        let strict = user_prompt("Alice: hi", true);
        assert!(!relaxed.contains("could not be parsed"));
        assert!(strict.contains("could not be parsed"));
    }
}
