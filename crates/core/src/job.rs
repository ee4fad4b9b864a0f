//! The batch job and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::id::JobId;
use crate::record::Record;

/// Job lifecycle status.
///
/// `pending -> processing -> {completed, failed}`; a pending job may also fail
/// directly when a fault hits before processing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted batch, as persisted in the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Fixed at creation; processing follows this order.
    pub records: Vec<Record>,
    pub total_records: u64,
    #[serde(default)]
    pub processed_records: u64,
    #[serde(default)]
    pub failed_records: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Refreshed on every write; doubles as the processing heartbeat.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, owned by the store.
    #[serde(default)]
    pub version: u64,
}

impl Job {
    /// Create a pending job over the accepted records.
    pub fn new(records: Vec<Record>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            total_records: records.len() as u64,
            records,
            processed_records: 0,
            failed_records: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            error: None,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Records attempted so far, successful or not.
    pub fn attempted(&self) -> u64 {
        self.processed_records + self.failed_records
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `pending -> processing`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.started_at.get_or_insert(now);
        Ok(())
    }

    /// Account one record attempt. Counts never exceed `total_records`.
    pub fn record_outcome(&mut self, success: bool) {
        if self.attempted() >= self.total_records {
            return;
        }
        if success {
            self.processed_records += 1;
        } else {
            self.failed_records += 1;
        }
    }

    /// Finalize after the loop ran to the end.
    ///
    /// The job fails only when every record failed; partial failures still complete.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<JobStatus, TransitionError> {
        let outcome = if self.failed_records == self.total_records {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.transition(outcome)?;
        self.completed_at.get_or_insert(now);
        Ok(outcome)
    }

    /// Abort on an unrecoverable fault. Counts are kept as they are.
    pub fn abort(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at.get_or_insert(now);
        Ok(())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot::from(self)
    }
}

/// Read-only view returned to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total_records: u64,
    pub processed_records: u64,
    pub failed_records: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            total_records: job.total_records,
            processed_records: job.processed_records,
            failed_records: job.failed_records,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error: job.error.clone(),
        }
    }
}
