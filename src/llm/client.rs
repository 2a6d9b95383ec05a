use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::Settings;
use crate::llm::gemini::GeminiClient;
use crate::storage::TranscriptSegment;

/// Result of a speaker name detection call.
#[derive(Debug, Default)]
pub struct SpeakerNameOutcome {
    /// Whether any name was inferred
    pub applied: bool,

    /// Inferred names keyed by diarization speaker id
    pub names: HashMap<i64, String>,
}

#[async_trait]
pub trait SpeakerNamer: Send + Sync {
    /// Infer human names for numeric speaker ids from conversational
    /// context. Callers treat every failure as non-fatal.
    async fn detect(&self, segments: &[TranscriptSegment]) -> Result<SpeakerNameOutcome>;
}

/// Build a speaker namer from runtime settings. Returns None when no
/// provider is configured, which disables enrichment.
pub fn build_namer(settings: &Settings) -> Result<Option<Box<dyn SpeakerNamer>>> {
    if settings.llm.api_key.trim().is_empty() {
        tracing::info!("No LLM API key configured; speaker naming disabled");
        return Ok(None);
    }

    match settings.llm.provider.to_lowercase().as_str() {
        "gemini" => Ok(Some(Box::new(GeminiClient::from_settings(settings)?))),
        other => anyhow::bail!(
            "Unsupported llm.provider '{}'. Supported providers: gemini",
            other
        ),
    }
}

/// Write inferred names onto segments, leaving unmapped speakers alone.
pub fn apply_names(segments: &mut [TranscriptSegment], names: &HashMap<i64, String>) {
    for segment in segments.iter_mut() {
        if let Some(speaker) = segment.speaker {
            if let Some(name) = names.get(&speaker) {
                segment.speaker_name = Some(name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn segment(speaker: Option<i64>) -> TranscriptSegment {
        let mut s = TranscriptSegment::new("job".to_string(), 0.0, 1.0, "hi".to_string());
        s.speaker = speaker;
        s
    }

    #[test]
    fn no_api_key_disables_enrichment() {
        let settings = Settings::default();
        let namer = build_namer(&settings).unwrap();
        assert!(namer.is_none());
    }

    #[test]
    fn unsupported_provider_returns_error() {
        let mut settings = Settings::default();
        settings.llm.provider = "unknown".to_string();
        settings.llm.api_key = "key".to_string();

        let err = match build_namer(&settings) {
            Ok(_) => panic!("expected provider creation to fail"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("Unsupported llm.provider"));
    }

    #[test]
    fn apply_names_skips_unmapped_speakers() {
        let mut segments = vec![segment(Some(1)), segment(Some(2)), segment(None)];
        let names = HashMap::from([(1, "Alice".to_string())]);

        apply_names(&mut segments, &names);

        assert_eq!(segments[0].speaker_name.as_deref(), Some("Alice"));
        assert!(segments[1].speaker_name.is_none());
        assert!(segments[2].speaker_name.is_none());
    }
}
