//! Job submission: validated batch in, persisted `pending` job out.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use batchflow_core::{Job, JobId, ServiceError, ServiceResult, validate_csv};

use super::store::JobStore;
use super::supervisor::JobSupervisor;

/// An uploaded batch file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// What the caller gets back for an accepted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub job_id: JobId,
    pub total_records: u64,
}

/// Validates uploads, persists jobs and hands them to the supervisor.
#[derive(Clone)]
pub struct JobSubmitter {
    store: Arc<dyn JobStore>,
    supervisor: JobSupervisor,
}

impl JobSubmitter {
    pub fn new(store: Arc<dyn JobStore>, supervisor: JobSupervisor) -> Self {
        Self { store, supervisor }
    }

    /// Accept a batch and start processing it in the background.
    ///
    /// Returns as soon as the job is stored; no record has been processed yet.
    /// Every call creates a new job, even for identical content.
    pub async fn submit(&self, upload: Option<Upload>) -> ServiceResult<SubmissionReceipt> {
        let upload = upload.ok_or_else(|| ServiceError::validation("No file uploaded"))?;
        if !upload.file_name.ends_with(".csv") {
            return Err(ServiceError::validation("Please upload a CSV file"));
        }

        let records = validate_csv(&upload.content)?;
        let mut job = Job::new(records);
        let receipt = SubmissionReceipt {
            job_id: job.id,
            total_records: job.total_records,
        };

        self.store.create(&job).await.map_err(|e| {
            error!(job_id = %job.id, error = %e, "failed to store job");
            ServiceError::internal(e.to_string())
        })?;
        if let Err(e) = self.store.add_pending(job.id).await {
            error!(job_id = %job.id, error = %e, "failed to index pending job");
            self.close_unindexed(&mut job, &e.to_string()).await;
            return Err(ServiceError::internal(e.to_string()));
        }

        drop(self.supervisor.dispatch(job.id));

        info!(
            job_id = %receipt.job_id,
            file = %upload.file_name,
            total = receipt.total_records,
            "job submitted"
        );
        Ok(receipt)
    }

    /// A stored job that never made it into the pending index would stay
    /// `pending` forever; fail it instead.
    async fn close_unindexed(&self, job: &mut Job, reason: &str) {
        if let Err(e) = job.abort(format!("failed to index job: {reason}"), Utc::now()) {
            error!(job_id = %job.id, error = %e, "cannot fail unindexed job");
            return;
        }
        if let Err(e) = self.store.update(job).await {
            error!(job_id = %job.id, error = %e, "failed to persist unindexed job failure");
        }
    }
}
