//! SQLite database management for jobs, files, and transcripts

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::config::Settings;
use crate::storage::models::{
    AudioFile, DiarizationStatus, JobStatus, TranscriptSegment, TranscriptionJob,
};

/// Database wrapper for scribed
pub struct Database {
    conn: Connection,
}

const CURRENT_SCHEMA_VERSION: i64 = 1;

impl Database {
    /// Open or create the database
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = settings.database_path();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::open_path(&db_path)
    }

    /// Open database at a specific path (useful for testing)
    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        // Enable foreign keys
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let current_version = self.schema_version()?;
        if current_version > CURRENT_SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is newer than supported version {}",
                current_version,
                CURRENT_SCHEMA_VERSION
            );
        }

        if current_version < 1 {
            self.migrate_to_v1()?;
            self.set_schema_version(1)?;
        }

        Ok(())
    }

    /// Current schema version tracked in PRAGMA user_version.
    pub fn schema_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))?)
    }

    fn set_schema_version(&self, version: i64) -> Result<()> {
        self.conn
            .execute(&format!("PRAGMA user_version = {}", version), [])?;
        Ok(())
    }

    fn migrate_to_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audio_files (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                source_path TEXT NOT NULL,
                duration_secs REAL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                language TEXT,
                model_size TEXT NOT NULL,
                diarization_enabled INTEGER NOT NULL DEFAULT 1,
                speaker_count_hint INTEGER,
                diarization_status TEXT NOT NULL DEFAULT 'not_attempted',
                diarization_error TEXT,
                last_error TEXT,
                started_at INTEGER,
                completed_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (file_id) REFERENCES audio_files(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status
                ON jobs(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_file_id
                ON jobs(file_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS transcript_segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                text TEXT NOT NULL,
                speaker INTEGER,
                speaker_name TEXT,
                FOREIGN KEY (job_id) REFERENCES jobs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_segments_job_id
                ON transcript_segments(job_id, start_time);
            "#,
        )?;

        Ok(())
    }

    // ----- audio files -----

    /// Register an audio file
    pub fn insert_audio_file(&self, file: &AudioFile) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO audio_files (id, file_name, source_path, duration_secs, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                file.id,
                file.file_name,
                file.source_path,
                file.duration_secs,
                file.created_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    /// Get an audio file by ID
    pub fn get_audio_file(&self, id: &str) -> Result<Option<AudioFile>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, file_name, source_path, duration_secs, created_at
                 FROM audio_files WHERE id = ?1",
                params![id],
                |row| {
                    Ok(AudioFile {
                        id: row.get(0)?,
                        file_name: row.get(1)?,
                        source_path: row.get(2)?,
                        duration_secs: row.get(3)?,
                        created_at: timestamp_to_datetime(row.get(4)?),
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    /// Set the derived duration on an audio file
    pub fn set_audio_file_duration(&self, id: &str, duration_secs: f64) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE audio_files SET duration_secs = ?2 WHERE id = ?1",
            params![id, duration_secs],
        )?;

        if updated == 0 {
            anyhow::bail!("audio file {} not found", id);
        }
        Ok(())
    }

    // ----- jobs -----

    /// Insert a new job
    pub fn insert_job(&self, job: &TranscriptionJob) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO jobs (
                id, file_id, status, progress, language, model_size,
                diarization_enabled, speaker_count_hint, diarization_status,
                diarization_error, last_error, started_at, completed_at,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                job.id,
                job.file_id,
                job.status.as_str(),
                job.progress,
                job.language,
                job.model_size,
                job.diarization_enabled,
                job.speaker_count_hint,
                job.diarization_status.as_str(),
                job.diarization_error,
                job.last_error,
                job.started_at.map(|t| t.timestamp()),
                job.completed_at.map(|t| t.timestamp()),
                job.created_at.timestamp(),
                job.updated_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &str) -> Result<Option<TranscriptionJob>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_JOB),
                params![id],
                Self::row_to_job,
            )
            .optional()?;

        Ok(result)
    }

    /// Find a job by ID prefix
    pub fn find_job_by_prefix(&self, prefix: &str) -> Result<Option<TranscriptionJob>> {
        let pattern = format!("{}%", prefix);

        let result = self
            .conn
            .query_row(
                &format!("{} WHERE id LIKE ?1 LIMIT 1", SELECT_JOB),
                params![pattern],
                Self::row_to_job,
            )
            .optional()?;

        Ok(result)
    }

    /// Most recent job for a file, regardless of state
    pub fn find_latest_job_for_file(&self, file_id: &str) -> Result<Option<TranscriptionJob>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE file_id = ?1 ORDER BY created_at DESC LIMIT 1",
                    SELECT_JOB
                ),
                params![file_id],
                Self::row_to_job,
            )
            .optional()?;

        Ok(result)
    }

    /// Most recent non-failed job for a file
    pub fn find_active_job_for_file(&self, file_id: &str) -> Result<Option<TranscriptionJob>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE file_id = ?1 AND status != 'failed'
                     ORDER BY created_at DESC LIMIT 1",
                    SELECT_JOB
                ),
                params![file_id],
                Self::row_to_job,
            )
            .optional()?;

        Ok(result)
    }

    /// Oldest pending jobs, up to `limit`
    pub fn find_pending_jobs(&self, limit: usize) -> Result<Vec<TranscriptionJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?1",
            SELECT_JOB
        ))?;

        let jobs = stmt
            .query_map(params![limit], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(jobs)
    }

    /// List jobs ordered by creation date
    pub fn list_jobs(&self, limit: usize) -> Result<Vec<TranscriptionJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} ORDER BY created_at DESC LIMIT ?1",
            SELECT_JOB
        ))?;

        let jobs = stmt
            .query_map(params![limit], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(jobs)
    }

    /// Atomically claim a pending job for processing.
    ///
    /// The conditional update is the claim: it only succeeds while the row
    /// is still pending, so two workers can never take the same job.
    pub fn claim_pending_job(&self, id: &str, started_at: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.execute(
            r#"
            UPDATE jobs
            SET status = 'processing', progress = ?2, diarization_status = 'in_progress',
                started_at = ?3, updated_at = ?4
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![
                id,
                crate::jobs::PROGRESS_CLAIMED,
                started_at.timestamp(),
                Utc::now().timestamp(),
            ],
        )?;

        Ok(updated == 1)
    }

    /// Update job progress
    pub fn update_job_progress(&self, id: &str, progress: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET progress = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, progress, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Persist a finished transcript and mark the job completed
    pub fn complete_job(
        &self,
        id: &str,
        segments: &[TranscriptSegment],
        diarization_status: DiarizationStatus,
        diarization_error: Option<&str>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        for segment in segments {
            tx.execute(
                r#"
                INSERT INTO transcript_segments
                    (job_id, start_time, end_time, text, speaker, speaker_name)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    id,
                    segment.start_time,
                    segment.end_time,
                    segment.text,
                    segment.speaker,
                    segment.speaker_name,
                ],
            )?;
        }

        let now = Utc::now().timestamp();
        tx.execute(
            r#"
            UPDATE jobs
            SET status = 'completed', progress = 100, diarization_status = ?2,
                diarization_error = ?3, last_error = NULL,
                completed_at = ?4, updated_at = ?4
            WHERE id = ?1
            "#,
            params![id, diarization_status.as_str(), diarization_error, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Mark a job failed with an error message
    pub fn fail_job(
        &self,
        id: &str,
        last_error: &str,
        diarization_error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        self.conn.execute(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = ?2,
                diarization_status = 'failed', diarization_error = ?3,
                completed_at = ?4, updated_at = ?4
            WHERE id = ?1
            "#,
            params![id, last_error, diarization_error, now],
        )?;
        Ok(())
    }

    /// Cancel a job unless it already completed. Returns false when the
    /// conditional update found no eligible row.
    pub fn cancel_job(&self, id: &str) -> Result<bool> {
        let now = Utc::now().timestamp();
        let updated = self.conn.execute(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = 'cancelled',
                completed_at = ?2, updated_at = ?2
            WHERE id = ?1 AND status != 'completed'
            "#,
            params![id, now],
        )?;

        Ok(updated == 1)
    }

    /// Reset a failed job back to pending. Returns false when the job was
    /// not in the failed state.
    pub fn retry_job(&self, id: &str) -> Result<bool> {
        let updated = self.conn.execute(
            r#"
            UPDATE jobs
            SET status = 'pending', progress = 0, last_error = NULL,
                diarization_status = 'not_attempted', diarization_error = NULL,
                started_at = NULL, completed_at = NULL, updated_at = ?2
            WHERE id = ?1 AND status = 'failed'
            "#,
            params![id, Utc::now().timestamp()],
        )?;

        Ok(updated == 1)
    }

    // ----- transcript segments -----

    /// Get transcript segments for a job
    pub fn get_transcript_segments(&self, job_id: &str) -> Result<Vec<TranscriptSegment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, start_time, end_time, text, speaker, speaker_name
             FROM transcript_segments
             WHERE job_id = ?1
             ORDER BY start_time",
        )?;

        let segments = stmt
            .query_map(params![job_id], |row| {
                Ok(TranscriptSegment {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    start_time: row.get(2)?,
                    end_time: row.get(3)?,
                    text: row.get(4)?,
                    speaker: row.get(5)?,
                    speaker_name: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(segments)
    }

    /// Delete a job and its segments
    pub fn delete_job(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(())
    }

    // Helper to convert a row to a TranscriptionJob
    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<TranscriptionJob> {
        let status: String = row.get(2)?;
        let diarization_status: String = row.get(8)?;
        let started_at: Option<i64> = row.get(11)?;
        let completed_at: Option<i64> = row.get(12)?;
        let created_at: i64 = row.get(13)?;
        let updated_at: i64 = row.get(14)?;

        Ok(TranscriptionJob {
            id: row.get(0)?,
            file_id: row.get(1)?,
            status: status.parse().unwrap_or(JobStatus::Failed),
            progress: row.get(3)?,
            language: row.get(4)?,
            model_size: row.get(5)?,
            diarization_enabled: row.get(6)?,
            speaker_count_hint: row.get(7)?,
            diarization_status: diarization_status
                .parse()
                .unwrap_or(DiarizationStatus::NotAttempted),
            diarization_error: row.get(9)?,
            last_error: row.get(10)?,
            started_at: started_at.map(timestamp_to_datetime),
            completed_at: completed_at.map(timestamp_to_datetime),
            created_at: timestamp_to_datetime(created_at),
            updated_at: timestamp_to_datetime(updated_at),
        })
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let total_files: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM audio_files", [], |row| row.get(0))?;

        let count_status = |status: &str| -> Result<i64> {
            Ok(self.conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )?)
        };

        Ok(DatabaseStats {
            total_files: total_files as usize,
            pending_jobs: count_status("pending")? as usize,
            processing_jobs: count_status("processing")? as usize,
            completed_jobs: count_status("completed")? as usize,
            failed_jobs: count_status("failed")? as usize,
        })
    }
}

const SELECT_JOB: &str = "SELECT id, file_id, status, progress, language, model_size,
        diarization_enabled, speaker_count_hint, diarization_status,
        diarization_error, last_error, started_at, completed_at,
        created_at, updated_at
 FROM jobs";

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub total_files: usize,
    pub pending_jobs: usize,
    pub processing_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::JobOptions;

    fn test_job(db: &Database) -> TranscriptionJob {
        let file = AudioFile::new("standup.wav".to_string(), "/tmp/standup.wav".to_string());
        db.insert_audio_file(&file).unwrap();

        let job = TranscriptionJob::new(
            file.id.clone(),
            JobOptions {
                language: Some("en".to_string()),
                model_size: "base".to_string(),
                diarization_enabled: true,
                speaker_count_hint: Some(2),
            },
        );
        db.insert_job(&job).unwrap();
        job
    }

    #[test]
    fn test_create_database() {
        let db = Database::open_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_files, 0);
    }

    #[test]
    fn test_insert_and_get_job() {
        let db = Database::open_memory().unwrap();
        let job = test_job(&db);

        let retrieved = db.get_job(&job.id).unwrap().unwrap();
        assert_eq!(retrieved.status, JobStatus::Pending);
        assert_eq!(retrieved.language.as_deref(), Some("en"));
        assert_eq!(retrieved.speaker_count_hint, Some(2));
    }

    #[test]
    fn claim_succeeds_exactly_once() {
        let db = Database::open_memory().unwrap();
        let job = test_job(&db);

        assert!(db.claim_pending_job(&job.id, Utc::now()).unwrap());
        assert!(!db.claim_pending_job(&job.id, Utc::now()).unwrap());

        let claimed = db.get_job(&job.id).unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.progress, crate::jobs::PROGRESS_CLAIMED);
        assert_eq!(claimed.diarization_status, DiarizationStatus::InProgress);
        assert!(claimed.started_at.is_some());
    }

    #[test]
    fn complete_persists_transcript_and_caps_progress() {
        let db = Database::open_memory().unwrap();
        let job = test_job(&db);
        db.claim_pending_job(&job.id, Utc::now()).unwrap();

        let mut segment =
            TranscriptSegment::new(job.id.clone(), 0.0, 4.5, "hello there".to_string());
        segment.speaker = Some(1);
        db.complete_job(&job.id, &[segment], DiarizationStatus::Success, None)
            .unwrap();

        let done = db.get_job(&job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());

        let segments = db.get_transcript_segments(&job.id).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].speaker, Some(1));
    }

    #[test]
    fn cancel_refuses_completed_jobs() {
        let db = Database::open_memory().unwrap();
        let job = test_job(&db);
        db.claim_pending_job(&job.id, Utc::now()).unwrap();
        db.complete_job(&job.id, &[], DiarizationStatus::NoSpeakersDetected, None)
            .unwrap();

        assert!(!db.cancel_job(&job.id).unwrap());
    }

    #[test]
    fn retry_resets_failed_job() {
        let db = Database::open_memory().unwrap();
        let job = test_job(&db);
        db.claim_pending_job(&job.id, Utc::now()).unwrap();
        db.fail_job(&job.id, "engine blew up", Some("engine blew up"))
            .unwrap();

        assert!(db.retry_job(&job.id).unwrap());

        let reset = db.get_job(&job.id).unwrap().unwrap();
        assert_eq!(reset.status, JobStatus::Pending);
        assert_eq!(reset.progress, 0);
        assert!(reset.last_error.is_none());
        assert_eq!(reset.diarization_status, DiarizationStatus::NotAttempted);

        // A completed job can never be retried
        db.claim_pending_job(&job.id, Utc::now()).unwrap();
        db.complete_job(&job.id, &[], DiarizationStatus::NoSpeakersDetected, None)
            .unwrap();
        assert!(!db.retry_job(&job.id).unwrap());
    }

    #[test]
    fn deleting_job_removes_transcript_segments() {
        let db = Database::open_memory().unwrap();
        let job = test_job(&db);
        db.claim_pending_job(&job.id, Utc::now()).unwrap();

        let segment = TranscriptSegment::new(job.id.clone(), 0.0, 2.0, "temp".to_string());
        db.complete_job(&job.id, &[segment], DiarizationStatus::NoSpeakersDetected, None)
            .unwrap();

        db.delete_job(&job.id).unwrap();
        assert!(db.get_transcript_segments(&job.id).unwrap().is_empty());
        assert!(db.get_job(&job.id).unwrap().is_none());
    }
}
