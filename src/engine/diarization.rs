//! Diarization outcome resolution
//!
//! The engine's metadata sidecar is authoritative when it mentions
//! diarization, but it is not always produced; without it the outcome is
//! inferred from the segments themselves.

use crate::engine::parser::ParsedSegment;
use crate::engine::sidecar::EngineSidecar;
use crate::storage::DiarizationStatus;

/// Resolved diarization outcome for a finished engine run
#[derive(Debug, Clone, PartialEq)]
pub struct DiarizationOutcome {
    pub status: DiarizationStatus,
    pub error: Option<String>,
}

impl DiarizationOutcome {
    fn success() -> Self {
        Self {
            status: DiarizationStatus::Success,
            error: None,
        }
    }

    fn no_speakers() -> Self {
        Self {
            status: DiarizationStatus::NoSpeakersDetected,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            status: DiarizationStatus::Failed,
            error: Some(error),
        }
    }
}

/// Classify the diarization outcome from sidecar metadata when available,
/// falling back to the speaker-label heuristic otherwise.
pub fn resolve(
    sidecar: Option<&EngineSidecar>,
    segments: &[ParsedSegment],
) -> DiarizationOutcome {
    if let Some(meta) = sidecar {
        if meta.mentions_diarization() {
            if meta.diarization_success == Some(true) {
                return DiarizationOutcome::success();
            }

            let mut message = meta
                .diarization_error
                .clone()
                .unwrap_or_else(|| "diarization failed".to_string());

            if meta.format_conversion_failed() {
                let conversion = meta
                    .format_conversion_error
                    .as_deref()
                    .unwrap_or("unknown error");
                message = format!("audio format conversion failed: {}; {}", conversion, message);
            }

            return DiarizationOutcome::failed(message);
        }
    }

    if segments.iter().any(|s| s.speaker.is_some()) {
        DiarizationOutcome::success()
    } else {
        DiarizationOutcome::no_speakers()
    }
}
