//! Read-only job status lookups for polling clients.

use std::sync::Arc;

use tracing::error;

use batchflow_core::{JobId, JobSnapshot, ServiceError, ServiceResult};

use super::store::JobStore;

#[derive(Clone)]
pub struct JobStatusReporter {
    store: Arc<dyn JobStore>,
}

impl JobStatusReporter {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Snapshot of the job's last persisted state.
    ///
    /// An absent or empty id is [`ServiceError::MissingJobId`]; an id that does
    /// not parse or names no job is [`ServiceError::NotFound`].
    pub async fn snapshot(&self, job_id: Option<&str>) -> ServiceResult<JobSnapshot> {
        let raw = job_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ServiceError::MissingJobId)?;
        let id: JobId = raw.parse()?;

        let job = self.store.get(id).await.map_err(|e| {
            error!(job_id = %id, error = %e, "failed to read job");
            ServiceError::internal(e.to_string())
        })?;

        job.map(|job| job.snapshot())
            .ok_or_else(|| ServiceError::not_found(raw))
    }
}
