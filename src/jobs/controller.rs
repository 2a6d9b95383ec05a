//! Job lifecycle orchestration
//!
//! The controller owns every job state transition. Collaborators are
//! injected through the constructor; nothing here reaches for a global
//! handle.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audio::AudioSource;
use crate::engine::invoker::{AttemptEvent, EngineInvoker, EngineRequest};
use crate::engine::{diarization, parser};
use crate::jobs::duration::transcript_duration_secs;
use crate::jobs::{
    PROGRESS_AUDIO_READY, PROGRESS_ENGINE_FALLBACK, PROGRESS_ENGINE_STARTED,
    PROGRESS_OUTPUT_VERIFIED,
};
use crate::llm::{apply_names, SpeakerNamer};
use crate::storage::{DiarizationStatus, JobRepository, JobStatus, TranscriptSegment, TranscriptionJob};
use crate::{Result, ScribedError};

/// Drives a job from claim to terminal state
pub struct JobLifecycleController {
    repo: Arc<dyn JobRepository>,
    source: Arc<dyn AudioSource>,
    invoker: Arc<EngineInvoker>,
    namer: Option<Arc<dyn SpeakerNamer>>,
}

impl JobLifecycleController {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        source: Arc<dyn AudioSource>,
        invoker: Arc<EngineInvoker>,
        namer: Option<Arc<dyn SpeakerNamer>>,
    ) -> Self {
        Self {
            repo,
            source,
            invoker,
            namer,
        }
    }

    /// Claim a pending job for processing. The underlying update is
    /// conditional, so a job can only ever be started once.
    pub fn start(&self, job: &TranscriptionJob) -> Result<()> {
        if job.status != JobStatus::Pending {
            return Err(ScribedError::InvalidState {
                action: "start",
                status: job.status,
            });
        }

        if !self.repo.claim_pending(&job.id, Utc::now())? {
            // Another worker won the claim between our read and now
            let status = self
                .repo
                .find_job(&job.id)?
                .map(|j| j.status)
                .unwrap_or(job.status);
            return Err(ScribedError::InvalidState {
                action: "start",
                status,
            });
        }

        Ok(())
    }

    /// Orchestrate a claimed job: resolve audio, invoke the engine with
    /// device fallback, normalize output, settle diarization, enrich,
    /// derive duration, and persist the terminal state.
    ///
    /// Any stage error lands in the single recovery below: the job is
    /// marked failed with the error message and a failed diarization
    /// status.
    pub async fn run(&self, job: &TranscriptionJob) -> Result<()> {
        match self.execute(job).await {
            Ok(()) => {
                info!("Job {} completed", job.id);
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                error!("Job {} failed: {}", job.id, message);

                if let Err(persist) = self.repo.fail_with_error(&job.id, &message, Some(&message))
                {
                    // Known risk: the job stays in 'processing' when this
                    // final write fails.
                    error!(
                        "Failed to persist failure for job {}: {}; job may remain in processing",
                        job.id, persist
                    );
                }

                Err(err)
            }
        }
    }

    async fn execute(&self, job: &TranscriptionJob) -> Result<()> {
        let file = self
            .repo
            .get_file(&job.file_id)?
            .ok_or_else(|| ScribedError::NotFound(format!("audio file {}", job.file_id)))?;

        // Scratch space for staged audio and engine output; removed on
        // every exit path when the guard drops.
        let work_dir = tempfile::tempdir()?;

        let audio_path = self.source.resolve(&file, work_dir.path()).await?;
        self.repo.update_progress(&job.id, PROGRESS_AUDIO_READY)?;

        let request = EngineRequest {
            audio_path: &audio_path,
            work_dir: work_dir.path(),
            model_size: &job.model_size,
            language: job.language.as_deref(),
            diarization: job.diarization_enabled,
            speaker_count_hint: job.speaker_count_hint,
        };

        let run = self
            .invoker
            .transcribe(&request, |event| {
                let milestone = match event {
                    AttemptEvent::Started { .. } => PROGRESS_ENGINE_STARTED,
                    AttemptEvent::FallingBack { .. } => PROGRESS_ENGINE_FALLBACK,
                };
                if let Err(e) = self.repo.update_progress(&job.id, milestone) {
                    warn!("Failed to record progress for job {}: {}", job.id, e);
                }
            })
            .await?;

        if run.raw_output.trim().is_empty() {
            return Err(ScribedError::Parse("empty transcript".to_string()));
        }
        self.repo.update_progress(&job.id, PROGRESS_OUTPUT_VERIFIED)?;

        let parsed = parser::parse(&run.raw_output);
        if parsed.is_empty() {
            return Err(ScribedError::Parse("empty transcript".to_string()));
        }

        let outcome = diarization::resolve(run.sidecar.as_ref(), &parsed);
        debug!(
            "Job {} diarization resolved to {} (device {})",
            job.id, outcome.status, run.device
        );

        let mut segments: Vec<TranscriptSegment> = parsed
            .into_iter()
            .map(|p| {
                let mut segment =
                    TranscriptSegment::new(job.id.clone(), p.start, p.end, p.text);
                segment.speaker = p.speaker;
                segment
            })
            .collect();

        if outcome.status == DiarizationStatus::Success {
            self.enrich(&job.id, &mut segments).await;
        }

        self.repo.complete_with_results(
            &job.id,
            &segments,
            outcome.status,
            outcome.error.as_deref(),
        )?;

        // Duration propagation is a best-effort side effect
        let duration = transcript_duration_secs(&segments);
        if duration > 0.0 {
            if let Err(e) = self.repo.set_file_duration(&job.file_id, duration) {
                warn!(
                    "Failed to persist duration for file {}: {}",
                    job.file_id, e
                );
            }
        }

        Ok(())
    }

    /// Speaker naming never gates completion; every failure path keeps the
    /// original segments.
    async fn enrich(&self, job_id: &str, segments: &mut [TranscriptSegment]) {
        let Some(namer) = &self.namer else {
            return;
        };

        match namer.detect(segments).await {
            Ok(outcome) if outcome.applied => {
                info!(
                    "Job {}: inferred {} speaker name(s)",
                    job_id,
                    outcome.names.len()
                );
                apply_names(segments, &outcome.names);
            }
            Ok(_) => {
                debug!("Job {}: no speaker names inferred", job_id);
            }
            Err(e) => {
                warn!("Job {}: speaker naming failed, keeping ids: {}", job_id, e);
            }
        }
    }

    /// Cancel a job unless it already completed.
    pub fn cancel(&self, job: &TranscriptionJob) -> Result<()> {
        if job.status == JobStatus::Completed {
            return Err(ScribedError::InvalidState {
                action: "cancel",
                status: job.status,
            });
        }

        if !self.repo.cancel(&job.id)? {
            let status = self
                .repo
                .find_job(&job.id)?
                .map(|j| j.status)
                .unwrap_or(job.status);
            return Err(ScribedError::InvalidState {
                action: "cancel",
                status,
            });
        }

        info!("Job {} cancelled", job.id);
        Ok(())
    }

    /// Reset a failed job back to pending.
    pub fn retry(&self, job: &TranscriptionJob) -> Result<()> {
        if job.status != JobStatus::Failed {
            return Err(ScribedError::InvalidState {
                action: "retry",
                status: job.status,
            });
        }

        if !self.repo.reset_for_retry(&job.id)? {
            let status = self
                .repo
                .find_job(&job.id)?
                .map(|j| j.status)
                .unwrap_or(job.status);
            return Err(ScribedError::InvalidState {
                action: "retry",
                status,
            });
        }

        info!("Job {} queued for retry", job.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::LocalAudioSource;
    use crate::config::Settings;
    use crate::storage::{AudioFile, Database, JobOptions, SqliteRepository};

    fn controller_with_repo() -> (Arc<SqliteRepository>, JobLifecycleController) {
        let repo = Arc::new(SqliteRepository::new(Database::open_memory().unwrap()));
        let controller = JobLifecycleController::new(
            repo.clone(),
            Arc::new(LocalAudioSource),
            Arc::new(EngineInvoker::from_settings(&Settings::default())),
            None,
        );
        (repo, controller)
    }

    fn seeded_job(repo: &SqliteRepository) -> TranscriptionJob {
        let file = AudioFile::new("a.wav".to_string(), "/tmp/a.wav".to_string());
        repo.create_file(&file).unwrap();
        let job = TranscriptionJob::new(
            file.id,
            JobOptions {
                language: None,
                model_size: "base".to_string(),
                diarization_enabled: true,
                speaker_count_hint: None,
            },
        );
        repo.create_job(&job).unwrap();
        job
    }

    #[test]
    fn start_rejects_non_pending_jobs_without_mutation() {
        let (repo, controller) = controller_with_repo();
        let job = seeded_job(&repo);

        controller.start(&job).unwrap();
        let processing = repo.find_job(&job.id).unwrap().unwrap();

        let err = controller.start(&processing).unwrap_err();
        assert!(matches!(
            err,
            ScribedError::InvalidState {
                action: "start",
                status: JobStatus::Processing
            }
        ));

        // The failed start did not touch the job
        let unchanged = repo.find_job(&job.id).unwrap().unwrap();
        assert_eq!(unchanged.status, JobStatus::Processing);
        assert_eq!(unchanged.progress, crate::jobs::PROGRESS_CLAIMED);
    }

    #[test]
    fn start_detects_lost_claim_race() {
        let (repo, controller) = controller_with_repo();
        let job = seeded_job(&repo);

        // A competing worker claims between our read and our start
        repo.claim_pending(&job.id, Utc::now()).unwrap();

        let err = controller.start(&job).unwrap_err();
        assert!(matches!(err, ScribedError::InvalidState { .. }));
    }

    #[test]
    fn cancel_rejects_completed_jobs() {
        let (repo, controller) = controller_with_repo();
        let job = seeded_job(&repo);

        repo.claim_pending(&job.id, Utc::now()).unwrap();
        repo.complete_with_results(&job.id, &[], DiarizationStatus::NoSpeakersDetected, None)
            .unwrap();

        let completed = repo.find_job(&job.id).unwrap().unwrap();
        let err = controller.cancel(&completed).unwrap_err();
        assert!(matches!(
            err,
            ScribedError::InvalidState {
                action: "cancel",
                ..
            }
        ));
    }

    #[test]
    fn cancel_marks_pending_job_failed_with_reason() {
        let (repo, controller) = controller_with_repo();
        let job = seeded_job(&repo);

        controller.cancel(&job).unwrap();

        let cancelled = repo.find_job(&job.id).unwrap().unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        assert_eq!(cancelled.last_error.as_deref(), Some("cancelled"));
        assert!(cancelled.completed_at.is_some());
    }

    #[test]
    fn retry_requires_failed_status() {
        let (repo, controller) = controller_with_repo();
        let job = seeded_job(&repo);

        let err = controller.retry(&job).unwrap_err();
        assert!(matches!(
            err,
            ScribedError::InvalidState {
                action: "retry",
                ..
            }
        ));

        controller.cancel(&job).unwrap();
        let failed = repo.find_job(&job.id).unwrap().unwrap();
        controller.retry(&failed).unwrap();

        let pending = repo.find_job(&job.id).unwrap().unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        assert_eq!(pending.progress, 0);
    }
}
