//! Audio duration derivation

use crate::storage::TranscriptSegment;

/// Derive the audio duration from a transcript: the latest segment end,
/// or 0 for an empty transcript.
pub fn transcript_duration_secs(segments: &[TranscriptSegment]) -> f64 {
    segments
        .iter()
        .map(|segment| segment.end_time)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(end: f64) -> TranscriptSegment {
        TranscriptSegment::new("job".to_string(), 0.0, end, "text".to_string())
    }

    #[test]
    fn duration_is_latest_segment_end() {
        let segments = vec![segment(3.0), segment(9.0), segment(5.0)];
        assert_eq!(transcript_duration_secs(&segments), 9.0);
    }

    #[test]
    fn empty_transcript_has_zero_duration() {
        assert_eq!(transcript_duration_secs(&[]), 0.0);
    }
}
