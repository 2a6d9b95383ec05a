//! Job repository interface and SQLite implementation
//!
//! The pipeline only sees this trait; the controller and worker receive a
//! repository through their constructors rather than reaching for a global
//! handle.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::config::Settings;
use crate::storage::database::{Database, DatabaseStats};
use crate::storage::models::{
    AudioFile, DiarizationStatus, TranscriptSegment, TranscriptionJob,
};
use crate::{Result, ScribedError};

/// Persistence boundary for jobs, files, and transcripts
pub trait JobRepository: Send + Sync {
    fn create_file(&self, file: &AudioFile) -> Result<()>;
    fn get_file(&self, id: &str) -> Result<Option<AudioFile>>;

    /// Best-effort duration sink; callers log failures instead of
    /// propagating them
    fn set_file_duration(&self, id: &str, duration_secs: f64) -> Result<()>;

    fn create_job(&self, job: &TranscriptionJob) -> Result<()>;
    fn find_job(&self, id: &str) -> Result<Option<TranscriptionJob>>;
    fn find_job_by_prefix(&self, prefix: &str) -> Result<Option<TranscriptionJob>>;
    fn find_latest_job_for_file(&self, file_id: &str) -> Result<Option<TranscriptionJob>>;
    fn find_active_job_for_file(&self, file_id: &str) -> Result<Option<TranscriptionJob>>;
    fn find_pending_jobs(&self, limit: usize) -> Result<Vec<TranscriptionJob>>;
    fn list_jobs(&self, limit: usize) -> Result<Vec<TranscriptionJob>>;

    /// Atomic `pending -> processing` transition; false when another
    /// worker won the claim
    fn claim_pending(&self, id: &str, started_at: DateTime<Utc>) -> Result<bool>;

    fn update_progress(&self, id: &str, progress: i64) -> Result<()>;

    fn complete_with_results(
        &self,
        id: &str,
        segments: &[TranscriptSegment],
        diarization_status: DiarizationStatus,
        diarization_error: Option<&str>,
    ) -> Result<()>;

    fn fail_with_error(
        &self,
        id: &str,
        last_error: &str,
        diarization_error: Option<&str>,
    ) -> Result<()>;

    /// Conditional cancel; false when the job already completed
    fn cancel(&self, id: &str) -> Result<bool>;

    /// Conditional `failed -> pending` reset; false when the job was not
    /// failed
    fn reset_for_retry(&self, id: &str) -> Result<bool>;

    fn transcript(&self, job_id: &str) -> Result<Vec<TranscriptSegment>>;
    fn stats(&self) -> Result<DatabaseStats>;
}

/// SQLite-backed repository
pub struct SqliteRepository {
    db: Mutex<Database>,
}

impl SqliteRepository {
    /// Open the repository over the configured database
    pub fn open(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(Database::open(settings)?))
    }

    /// Wrap an already-open database (useful for in-memory tests)
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> anyhow::Result<T>) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| ScribedError::Other("repository lock poisoned".to_string()))?;
        f(&db).map_err(persistence_error)
    }
}

/// Fold an anyhow persistence error into the crate taxonomy, keeping the
/// raw rusqlite error when that is what failed.
fn persistence_error(err: anyhow::Error) -> ScribedError {
    match err.downcast::<rusqlite::Error>() {
        Ok(sql) => ScribedError::Database(sql),
        Err(other) => ScribedError::Other(other.to_string()),
    }
}

impl JobRepository for SqliteRepository {
    fn create_file(&self, file: &AudioFile) -> Result<()> {
        self.with_db(|db| db.insert_audio_file(file))
    }

    fn get_file(&self, id: &str) -> Result<Option<AudioFile>> {
        self.with_db(|db| db.get_audio_file(id))
    }

    fn set_file_duration(&self, id: &str, duration_secs: f64) -> Result<()> {
        self.with_db(|db| db.set_audio_file_duration(id, duration_secs))
    }

    fn create_job(&self, job: &TranscriptionJob) -> Result<()> {
        self.with_db(|db| db.insert_job(job))
    }

    fn find_job(&self, id: &str) -> Result<Option<TranscriptionJob>> {
        self.with_db(|db| db.get_job(id))
    }

    fn find_job_by_prefix(&self, prefix: &str) -> Result<Option<TranscriptionJob>> {
        self.with_db(|db| db.find_job_by_prefix(prefix))
    }

    fn find_latest_job_for_file(&self, file_id: &str) -> Result<Option<TranscriptionJob>> {
        self.with_db(|db| db.find_latest_job_for_file(file_id))
    }

    fn find_active_job_for_file(&self, file_id: &str) -> Result<Option<TranscriptionJob>> {
        self.with_db(|db| db.find_active_job_for_file(file_id))
    }

    fn find_pending_jobs(&self, limit: usize) -> Result<Vec<TranscriptionJob>> {
        self.with_db(|db| db.find_pending_jobs(limit))
    }

    fn list_jobs(&self, limit: usize) -> Result<Vec<TranscriptionJob>> {
        self.with_db(|db| db.list_jobs(limit))
    }

    fn claim_pending(&self, id: &str, started_at: DateTime<Utc>) -> Result<bool> {
        self.with_db(|db| db.claim_pending_job(id, started_at))
    }

    fn update_progress(&self, id: &str, progress: i64) -> Result<()> {
        self.with_db(|db| db.update_job_progress(id, progress))
    }

    fn complete_with_results(
        &self,
        id: &str,
        segments: &[TranscriptSegment],
        diarization_status: DiarizationStatus,
        diarization_error: Option<&str>,
    ) -> Result<()> {
        self.with_db(|db| db.complete_job(id, segments, diarization_status, diarization_error))
    }

    fn fail_with_error(
        &self,
        id: &str,
        last_error: &str,
        diarization_error: Option<&str>,
    ) -> Result<()> {
        self.with_db(|db| db.fail_job(id, last_error, diarization_error))
    }

    fn cancel(&self, id: &str) -> Result<bool> {
        self.with_db(|db| db.cancel_job(id))
    }

    fn reset_for_retry(&self, id: &str) -> Result<bool> {
        self.with_db(|db| db.retry_job(id))
    }

    fn transcript(&self, job_id: &str) -> Result<Vec<TranscriptSegment>> {
        self.with_db(|db| db.get_transcript_segments(job_id))
    }

    fn stats(&self) -> Result<DatabaseStats> {
        self.with_db(|db| db.get_stats())
    }
}
