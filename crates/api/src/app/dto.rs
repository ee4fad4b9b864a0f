use serde::{Deserialize, Serialize};

use batchflow_core::JobId;
use batchflow_infra::jobs::SubmissionReceipt;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct JobStatusQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: &'static str,
    pub job_id: JobId,
    pub total_records: u64,
}

impl From<SubmissionReceipt> for UploadResponse {
    fn from(receipt: SubmissionReceipt) -> Self {
        Self {
            message: "File uploaded successfully",
            job_id: receipt.job_id,
            total_records: receipt.total_records,
        }
    }
}
