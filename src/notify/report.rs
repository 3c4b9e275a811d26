use crate::store::SessionBundle;

/// Render the full markdown report for a processed session.
pub fn render_report(bundle: &SessionBundle) -> String {
    let session = &bundle.session;
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("# Session Report: {}", session.name));
    lines.push(String::new());
    lines.push(format!("**Session ID:** `{}`", session.id));
    lines.push(format!(
        "**Date:** {}",
        session.started_at.format("%Y-%m-%d %H:%M")
    ));

    let secs = session.duration_seconds();
    if secs > 0 {
        let (hours, rem) = (secs / 3600, secs % 3600);
        let (minutes, seconds) = (rem / 60, rem % 60);
        lines.push(format!("**Duration:** {}h {}m {}s", hours, minutes, seconds));
    }
    lines.push(String::new());

    if let Some(transcript) = &bundle.transcript {
        lines.push("## Transcript Info".to_string());
        lines.push(format!("- **Speakers:** {}", transcript.speaker_count()));
        if let Some(lang) = &transcript.language {
            lines.push(format!("- **Language:** {}", lang));
        }
        if let Some(confidence) = transcript.average_confidence {
            lines.push(format!("- **Confidence:** {:.1}%", confidence * 100.0));
        }
        lines.push(format!(
            "- **Audio Duration:** {:.0} seconds",
            transcript.audio_duration_seconds
        ));
        lines.push(String::new());
    }

    if let Some(analysis) = &bundle.analysis {
        if !analysis.summary.is_empty() {
            lines.push("## Summary".to_string());
            lines.push(analysis.summary.clone());
            lines.push(String::new());
        }

        if !analysis.events.is_empty() {
            lines.push("## Key Events".to_string());
            for event in &analysis.events {
                lines.push(format!("{}. {}", event.order, event.description));
            }
            lines.push(String::new());
        }

        if !analysis.npcs.is_empty() {
            lines.push("## NPCs Mentioned".to_string());
            for npc in &analysis.npcs {
                lines.push(format!("### {}", npc.name));
                if !npc.description.is_empty() {
                    lines.push(npc.description.clone());
                }
                lines.push(String::new());
            }
        }

        if !analysis.locations.is_empty() {
            lines.push("## Locations".to_string());
            for location in &analysis.locations {
                lines.push(format!("### {}", location.name));
                if !location.description.is_empty() {
                    lines.push(location.description.clone());
                }
                lines.push(String::new());
            }
        }
    }

    if let Some(transcript) = &bundle.transcript {
        if !transcript.utterances.is_empty() {
            lines.push("## Full Transcript".to_string());
            lines.push(String::new());
            for utterance in &transcript.utterances {
                lines.push(format!("**{}:** {}", utterance.speaker, utterance.text));
                lines.push(String::new());
            }
        }
    }

    lines.push("---".to_string());
    lines.push("*Generated by session-scribe*".to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Analysis, NamedEntity, NarrativeEvent, Session, Transcript, Utterance};
    use uuid::Uuid;

    fn bundle() -> SessionBundle {
        let session = Session::start(1, Some("Tavern Brawl".into()), "user");
        let id = session.id;
        SessionBundle {
            session,
            merged: None,
            transcript: Some(Transcript {
                session_id: id,
                utterances: vec![Utterance {
                    speaker: "Alice".into(),
                    start_ms: 0,
                    end_ms: 1500,
                    text: "I flip the table".into(),
                    confidence: Some(0.95),
                }],
                audio_duration_seconds: 1.5,
                average_confidence: Some(0.95),
                language: Some("en".into()),
            }),
            analysis: Some(Analysis {
                session_id: id,
                summary: "A brawl broke out in the tavern.".into(),
                npcs: vec![NamedEntity {
                    name: "Durnan".into(),
                    description: "the barkeep".into(),
                }],
                locations: vec![NamedEntity {
                    name: "The Yawning Portal".into(),
                    description: String::new(),
                }],
                events: vec![NarrativeEvent {
                    order: 1,
                    description: "Alice flipped a table".into(),
                }],
                model: None,
                prompt_tokens: None,
                completion_tokens: None,
            }),
        }
    }

    #[test]
    fn test_report_contains_all_sections() {
        let report = render_report(&bundle());
        assert!(report.contains("# Session Report: Tavern Brawl"));
        assert!(report.contains("## Summary"));
        assert!(report.contains("## Key Events"));
        assert!(report.contains("### Durnan"));
        assert!(report.contains("### The Yawning Portal"));
        assert!(report.contains("**Alice:** I flip the table"));
    }

    #[test]
    fn test_report_without_artifacts_still_renders() {
        let mut b = bundle();
        b.transcript = None;
        b.analysis = None;
        let report = render_report(&b);
        assert!(report.contains("# Session Report"));
        assert!(!report.contains("## Summary"));
        assert!(!report.contains("## Full Transcript"));
    }
}
