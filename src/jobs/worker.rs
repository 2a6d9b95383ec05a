//! Polling worker loop
//!
//! Fetches batches of pending jobs and dispatches them through the
//! controller with bounded concurrency. Every dispatched task is tracked
//! to completion; nothing is fired and forgotten.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::jobs::controller::JobLifecycleController;
use crate::storage::JobRepository;
use crate::ScribedError;

/// Background worker processing pending transcription jobs
pub struct Worker {
    repo: Arc<dyn JobRepository>,
    controller: Arc<JobLifecycleController>,
    poll_interval: Duration,
    batch_size: usize,
    concurrency: usize,
}

impl Worker {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        controller: Arc<JobLifecycleController>,
        settings: &Settings,
    ) -> Self {
        Self {
            repo,
            controller,
            poll_interval: Duration::from_secs(settings.jobs.poll_interval_secs),
            batch_size: settings.jobs.batch_size,
            concurrency: settings.jobs.concurrency.max(1),
        }
    }

    /// Run the polling loop until interrupted. The batch in flight when a
    /// signal arrives is allowed to finish.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Worker started (poll every {}s, batch {}, concurrency {})",
            self.poll_interval.as_secs(),
            self.batch_size,
            self.concurrency
        );

        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, shutting down worker");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Termination requested, shutting down worker");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.tick().await;
                }
            }
        }

        Ok(())
    }

    /// One poll: claim and process up to a batch of pending jobs, waiting
    /// for all of them before returning.
    pub async fn tick(&self) {
        let pending = match self.repo.find_pending_jobs(self.batch_size) {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to fetch pending jobs: {}", e);
                return;
            }
        };

        if pending.is_empty() {
            return;
        }

        debug!("Dispatching {} pending job(s)", pending.len());

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for job in pending {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let controller = self.controller.clone();
            tasks.spawn(async move {
                let _permit = permit;

                // The claim is atomic; losing it means another worker has
                // the job and we simply move on.
                match controller.start(&job) {
                    Ok(()) => {}
                    Err(ScribedError::InvalidState { .. }) => {
                        debug!("Job {} already claimed elsewhere", job.id);
                        return;
                    }
                    Err(e) => {
                        error!("Failed to claim job {}: {}", job.id, e);
                        return;
                    }
                }

                if let Err(e) = controller.run(&job).await {
                    warn!("Job {} ended in failure: {}", job.id, e);
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Job task panicked: {}", e);
            }
        }
    }
}
