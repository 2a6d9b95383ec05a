use crate::storage::TranscriptSegment;

/// Longest transcript excerpt sent to the naming collaborator
const MAX_EXCERPT_CHARS: usize = 8000;

/// Build a deterministic speaker naming prompt from diarized segments.
pub fn build_speaker_naming_prompt(segments: &[TranscriptSegment]) -> String {
    format!(
        "You are an assistant that identifies speakers in a diarized transcript.\n\
Each line is prefixed with the numeric speaker id assigned by diarization.\n\
Infer the real name of each speaker from the conversation itself (people\n\
addressing or introducing each other).\n\
\n\
Return ONLY a JSON object mapping speaker ids to names, for example:\n\
{{\"1\": \"Alice\", \"2\": \"Bob\"}}\n\
\n\
Rules:\n\
- Include a speaker only when the transcript clearly supports the name.\n\
- Omit speakers you cannot name; never guess.\n\
- No text outside the JSON object.\n\
\n\
Transcript:\n\
{}",
        build_excerpt(segments)
    )
}

/// Render diarized segments as "Speaker N: text" lines, bounded in size.
fn build_excerpt(segments: &[TranscriptSegment]) -> String {
    let mut excerpt = String::new();

    for segment in segments {
        let line = match segment.speaker {
            Some(id) => format!("Speaker {}: {}\n", id, segment.text),
            None => format!("{}\n", segment.text),
        };

        if excerpt.len() + line.len() > MAX_EXCERPT_CHARS {
            break;
        }
        excerpt.push_str(&line);
    }

    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(speaker: Option<i64>, text: &str) -> TranscriptSegment {
        let mut s = TranscriptSegment::new("job".to_string(), 0.0, 1.0, text.to_string());
        s.speaker = speaker;
        s
    }

    #[test]
    fn prompt_carries_speaker_prefixed_lines() {
        let prompt = build_speaker_naming_prompt(&[
            segment(Some(1), "Hi, I'm Alice."),
            segment(Some(2), "Nice to meet you Alice, I'm Bob."),
        ]);

        assert!(prompt.contains("Speaker 1: Hi, I'm Alice."));
        assert!(prompt.contains("Speaker 2: Nice to meet you Alice, I'm Bob."));
    }

    #[test]
    fn excerpt_is_bounded() {
        let long_text = "word ".repeat(500);
        let segments: Vec<_> = (0..20).map(|i| segment(Some(i), &long_text)).collect();

        let excerpt = build_excerpt(&segments);
        assert!(excerpt.len() <= MAX_EXCERPT_CHARS);
    }
}
