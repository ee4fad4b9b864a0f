//! Supervised background runs.
//!
//! Every processor run is spawned through [`JobSupervisor`], which:
//!
//! - caps the number of runs active at once (extra jobs wait as `pending`)
//! - watches each run's task and fails the job if the task panics
//! - on startup, re-dispatches jobs that never started and fails jobs whose
//!   processing heartbeat went stale

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use batchflow_core::{JobId, JobStatus};

use super::processor::JobProcessor;
use super::store::JobStoreError;

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Maximum processor runs active at once.
    pub max_concurrent_jobs: usize,
    /// A `processing` job whose last write is older than this is considered stranded.
    pub stall_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 32,
            stall_timeout: Duration::from_secs(300),
        }
    }
}

impl SupervisorConfig {
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

/// Outcome of a pending-index sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Pending jobs dispatched again.
    pub requeued: usize,
    /// Processing jobs marked failed because their heartbeat went stale.
    pub stalled: usize,
    /// Index entries removed because the job was missing or already terminal.
    pub dropped: usize,
}

/// Spawns and watches processor runs.
#[derive(Clone)]
pub struct JobSupervisor {
    processor: Arc<JobProcessor>,
    permits: Arc<Semaphore>,
    config: SupervisorConfig,
}

impl JobSupervisor {
    pub fn new(processor: Arc<JobProcessor>, config: SupervisorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            processor,
            permits,
            config,
        }
    }

    /// Start one background run for `job_id` and return immediately.
    ///
    /// Dropping the handle detaches the run. The handle resolves to the job's
    /// stored status once the run ends, or `None` if it could not be read.
    pub fn dispatch(&self, job_id: JobId) -> JoinHandle<Option<JobStatus>> {
        let processor = self.processor.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %job_id, "supervisor closed; job left pending");
                    return None;
                }
            };

            let run = tokio::spawn({
                let processor = processor.clone();
                async move { processor.run(job_id).await }
            });

            match run.await {
                Ok(Ok(status)) => Some(status),
                // The processor already recorded the fault on the job.
                Ok(Err(_)) => last_status(&processor, job_id).await,
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        "job processor panicked"
                    } else {
                        "job processor was cancelled"
                    };
                    error!(job_id = %job_id, error = %join_err, "{reason}");
                    processor.abort_job(job_id, reason).await;
                    last_status(&processor, job_id).await
                }
            }
        })
    }

    /// Runs currently holding a slot.
    pub fn active_runs(&self) -> usize {
        self.config.max_concurrent_jobs.max(1) - self.permits.available_permits()
    }

    /// Startup sweep over the pending-job index.
    ///
    /// Must run before any new submission is accepted: `pending` jobs are
    /// dispatched again, which is only safe while nothing else is running.
    pub async fn recover(&self) -> Result<RecoveryReport, JobStoreError> {
        let store = self.processor.store();
        let mut report = RecoveryReport::default();

        for id in store.pending_ids().await? {
            match store.get(id).await? {
                None => {
                    store.remove_pending(id).await?;
                    report.dropped += 1;
                }
                Some(job) if job.is_terminal() => {
                    store.remove_pending(id).await?;
                    report.dropped += 1;
                }
                Some(job) if job.status == JobStatus::Pending => {
                    drop(self.dispatch(id));
                    report.requeued += 1;
                }
                Some(job) => {
                    if self.is_stalled(job.updated_at) {
                        self.processor.abort_job(id, "job processing stalled").await;
                        report.stalled += 1;
                    }
                }
            }
        }

        info!(
            requeued = report.requeued,
            stalled = report.stalled,
            dropped = report.dropped,
            "pending jobs recovered"
        );
        Ok(report)
    }

    /// Fail `processing` jobs whose heartbeat is older than the stall timeout.
    ///
    /// Safe to run while jobs are active: a live run whose job was failed here
    /// hits a version conflict on its next write and stops.
    pub async fn sweep_stalled(&self) -> Result<usize, JobStoreError> {
        let store = self.processor.store();
        let mut stalled = 0;

        for id in store.pending_ids().await? {
            let Some(job) = store.get(id).await? else {
                continue;
            };
            if job.status == JobStatus::Processing && self.is_stalled(job.updated_at) {
                self.processor.abort_job(id, "job processing stalled").await;
                stalled += 1;
            }
        }

        if stalled > 0 {
            warn!(stalled, "stalled jobs marked failed");
        }
        Ok(stalled)
    }

    /// Run [`Self::sweep_stalled`] every `period` (at least one second) in the background.
    pub fn spawn_stall_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let supervisor = self.clone();
        let period = period.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = supervisor.sweep_stalled().await {
                    error!(error = %e, "stall sweep failed");
                }
            }
        })
    }

    fn is_stalled(&self, last_write: chrono::DateTime<Utc>) -> bool {
        (Utc::now() - last_write)
            .to_std()
            .map(|age| age > self.config.stall_timeout)
            .unwrap_or(false)
    }
}

async fn last_status(processor: &JobProcessor, job_id: JobId) -> Option<JobStatus> {
    match processor.store().get(job_id).await {
        Ok(job) => job.map(|job| job.status),
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "could not read final job status");
            None
        }
    }
}
