//! Data models for storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a transcription job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be picked up by the worker
    Pending,
    /// Claimed and running
    Processing,
    /// Finished with a transcript
    Completed,
    /// Finished with an error (retryable)
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the speaker diarization stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiarizationStatus {
    /// Diarization was not requested or has not started
    NotAttempted,
    /// Job is processing and diarization has not resolved yet
    InProgress,
    /// The engine attributed segments to speakers
    Success,
    /// Diarization was attempted and failed
    Failed,
    /// Diarization ran but produced no speaker labels
    NoSpeakersDetected,
}

impl DiarizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::NoSpeakersDetected => "no_speakers_detected",
        }
    }
}

impl std::str::FromStr for DiarizationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_attempted" => Ok(Self::NotAttempted),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "no_speakers_detected" => Ok(Self::NoSpeakersDetected),
            other => Err(format!("unknown diarization status '{}'", other)),
        }
    }
}

impl std::fmt::Display for DiarizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered audio file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFile {
    /// Unique identifier (UUID)
    pub id: String,

    /// Original file name
    pub file_name: String,

    /// Path the registered audio lives at
    pub source_path: String,

    /// Duration in seconds, derived from the transcript after a job
    /// completes
    pub duration_secs: Option<f64>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AudioFile {
    /// Register a new audio file
    pub fn new(file_name: String, source_path: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name,
            source_path,
            duration_secs: None,
            created_at: Utc::now(),
        }
    }
}

/// One transcription attempt for one audio file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionJob {
    /// Unique identifier (UUID)
    pub id: String,

    /// Audio file this job transcribes
    pub file_id: String,

    /// Current lifecycle state
    pub status: JobStatus,

    /// Progress percentage, 0-100; reaches 100 only on completion
    pub progress: i64,

    /// Language hint for the engine (None = auto-detect)
    pub language: Option<String>,

    /// Engine model size (tiny, base, small, medium, large)
    pub model_size: String,

    /// Whether speaker diarization was requested
    pub diarization_enabled: bool,

    /// Expected number of speakers, if known
    pub speaker_count_hint: Option<u32>,

    /// Resolved diarization outcome
    pub diarization_status: DiarizationStatus,

    /// Diarization failure detail, set only when diarization failed
    pub diarization_error: Option<String>,

    /// Failure detail, set only when the job failed
    pub last_error: Option<String>,

    /// When the job entered processing
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl TranscriptionJob {
    /// Create a new pending job for a file
    pub fn new(file_id: String, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_id,
            status: JobStatus::Pending,
            progress: 0,
            language: options.language,
            model_size: options.model_size,
            diarization_enabled: options.diarization_enabled,
            speaker_count_hint: options.speaker_count_hint,
            diarization_status: DiarizationStatus::NotAttempted,
            diarization_error: None,
            last_error: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the job still counts toward the one-active-job-per-file
    /// policy
    pub fn is_active(&self) -> bool {
        !matches!(self.status, JobStatus::Failed)
    }
}

/// Per-job engine options chosen at submit time
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub language: Option<String>,
    pub model_size: String,
    pub diarization_enabled: bool,
    pub speaker_count_hint: Option<u32>,
}

/// A timestamped span of transcript text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Unique identifier
    pub id: i64,

    /// Job this segment belongs to
    pub job_id: String,

    /// Start time in seconds
    pub start_time: f64,

    /// End time in seconds
    pub end_time: f64,

    /// Transcribed text
    pub text: String,

    /// Speaker id assigned by diarization
    pub speaker: Option<i64>,

    /// Human name inferred by the enrichment step
    pub speaker_name: Option<String>,
}

impl TranscriptSegment {
    /// Create a new transcript segment
    pub fn new(job_id: String, start_time: f64, end_time: f64, text: String) -> Self {
        Self {
            id: 0, // Will be set by database
            job_id,
            start_time,
            end_time,
            text,
            speaker: None,
            speaker_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_pending_with_zero_progress() {
        let job = TranscriptionJob::new(
            "file-1".to_string(),
            JobOptions {
                language: None,
                model_size: "base".to_string(),
                diarization_enabled: true,
                speaker_count_hint: None,
            },
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.diarization_status, DiarizationStatus::NotAttempted);
        assert!(job.is_active());
    }

    #[test]
    fn failed_job_is_not_active() {
        let mut job = TranscriptionJob::new(
            "file-1".to_string(),
            JobOptions {
                language: None,
                model_size: "base".to_string(),
                diarization_enabled: false,
                speaker_count_hint: None,
            },
        );
        job.status = JobStatus::Failed;
        assert!(!job.is_active());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }
}
