//! Raw engine output normalization
//!
//! The recognizer's output format is not guaranteed: native WhisperX JSON,
//! plain diarized text, or bare text, depending on version and failure
//! mode. Parsing is total; malformed output degrades to a best-effort
//! reconstruction instead of an error.

use serde::Deserialize;

/// Length of the synthetic slot assigned to plain-text lines
const SYNTHETIC_SLOT_SECS: f64 = 5.0;

/// A segment reconstructed from raw engine output, before it is attached
/// to a job
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    segments: Vec<RawSegment>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: Option<f64>,
    end: Option<f64>,
    text: Option<String>,
    speaker: Option<SpeakerLabel>,
}

/// WhisperX emits `"SPEAKER_00"` style labels; older engine builds emit
/// bare integers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpeakerLabel {
    Id(i64),
    Name(String),
}

impl SpeakerLabel {
    fn to_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(name) => {
                let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            }
        }
    }
}

/// Normalize raw engine output into transcript segments.
///
/// Tiers, evaluated in order:
/// 1. JSON with a non-empty `segments` array: used directly, invalid
///    elements dropped.
/// 2. JSON with only a `text` field: wrapped as a single segment.
/// 3. Anything else non-empty: split on newlines with optional
///    `(speaker N)` prefixes and synthetic 5-second slots.
///
/// Empty output yields an empty vector; the caller decides whether that is
/// fatal.
pub fn parse(raw: &str) -> Vec<ParsedSegment> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    if let Ok(result) = serde_json::from_str::<RawResult>(raw) {
        if !result.segments.is_empty() {
            return result
                .segments
                .iter()
                .filter_map(validate_segment)
                .collect();
        }

        if let Some(text) = result.text {
            let text = text.trim().to_string();
            if !text.is_empty() {
                return vec![ParsedSegment {
                    start: 0.0,
                    end: 0.0,
                    text,
                    speaker: None,
                }];
            }
            return Vec::new();
        }
    }

    parse_plain_text(raw)
}

fn validate_segment(segment: &RawSegment) -> Option<ParsedSegment> {
    let start = segment.start?;
    let end = segment.end?;
    let text = segment.text.as_deref()?.trim();

    if text.is_empty() || start < 0.0 || end <= start {
        return None;
    }

    Some(ParsedSegment {
        start,
        end,
        text: text.to_string(),
        speaker: segment.speaker.as_ref().and_then(SpeakerLabel::to_id),
    })
}

/// Reconstruct segments from diarized or bare plain text.
///
/// Lines may carry a `(speaker N)` or `(speaker ?)` prefix. When any
/// marker appears, unmarked lines default to speaker 1; when none do, the
/// speaker is left unset.
fn parse_plain_text(raw: &str) -> Vec<ParsedSegment> {
    let lines: Vec<(Option<Option<i64>>, &str)> = raw
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match split_speaker_prefix(line) {
                Some((speaker, rest)) if !rest.is_empty() => Some((Some(speaker), rest)),
                Some(_) => None,
                None => Some((None, line)),
            }
        })
        .collect();

    let any_marker = lines.iter().any(|(marker, _)| marker.is_some());

    lines
        .into_iter()
        .enumerate()
        .map(|(i, (marker, text))| {
            let start = i as f64 * SYNTHETIC_SLOT_SECS;
            let speaker = match marker {
                Some(speaker) => speaker,
                None if any_marker => Some(1),
                None => None,
            };
            ParsedSegment {
                start,
                end: start + SYNTHETIC_SLOT_SECS,
                text: text.to_string(),
                speaker,
            }
        })
        .collect()
}

/// Split a `(speaker N)` or `(speaker ?)` prefix off a line. Returns the
/// speaker id (None for `?`) and the remaining text.
fn split_speaker_prefix(line: &str) -> Option<(Option<i64>, &str)> {
    let rest = line.strip_prefix("(speaker ")?;
    let close = rest.find(')')?;
    let label = rest[..close].trim();

    let speaker = if label == "?" {
        None
    } else {
        Some(label.parse::<i64>().ok()?)
    };

    Some((speaker, rest[close + 1..].trim()))
}
