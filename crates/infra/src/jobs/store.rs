//! Job storage: the key-value contract and its in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use batchflow_core::{Job, JobId};

/// Key of the pending-job index.
pub const PENDING_INDEX_KEY: &str = "csv_processing_jobs";

/// Key-value job persistence.
///
/// Jobs are stored whole, keyed by id. Writes are compare-and-set on
/// `Job::version`: a stale writer gets `Conflict` instead of silently
/// overwriting a newer copy.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job. Fails if the id is already taken.
    async fn create(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Overwrite a job if the stored version still matches `job.version`.
    ///
    /// On success `job.version` and `job.updated_at` reflect the stored copy.
    async fn update(&self, job: &mut Job) -> Result<(), JobStoreError>;

    /// Add an id to the pending-job index (no-op if present).
    async fn add_pending(&self, id: JobId) -> Result<(), JobStoreError>;

    /// Remove an id from the pending-job index (no-op if absent).
    async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError>;

    /// Ids currently in the pending-job index, oldest first.
    async fn pending_ids(&self) -> Result<Vec<JobId>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("version conflict on job {id}: expected {expected}, found {found}")]
    Conflict { id: JobId, expected: u64, found: u64 },
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    pending: RwLock<Vec<JobId>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, job: &mut Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&job.id).ok_or(JobStoreError::NotFound(job.id))?;

        if stored.version != job.version {
            return Err(JobStoreError::Conflict {
                id: job.id,
                expected: job.version,
                found: stored.version,
            });
        }

        job.version += 1;
        job.updated_at = Utc::now();
        *stored = job.clone();
        Ok(())
    }

    async fn add_pending(&self, id: JobId) -> Result<(), JobStoreError> {
        let mut pending = self.pending.write().await;
        if !pending.contains(&id) {
            pending.push(id);
        }
        Ok(())
    }

    async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError> {
        self.pending.write().await.retain(|p| *p != id);
        Ok(())
    }

    async fn pending_ids(&self) -> Result<Vec<JobId>, JobStoreError> {
        Ok(self.pending.read().await.clone())
    }
}
