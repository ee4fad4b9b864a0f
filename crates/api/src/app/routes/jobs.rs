use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Multipart, Query, multipart::MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
};

use batchflow_infra::jobs::Upload;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Multipart form field carrying the batch file.
const FILE_FIELD: &str = "file";

/// `POST /api/upload`: accept a CSV batch and start processing it.
#[tracing::instrument(skip(services, multipart))]
pub async fn upload(
    Extension(services): Extension<Arc<AppServices>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> axum::response::Response {
    let upload = match multipart {
        Ok(multipart) => match read_file_field(multipart).await {
            Ok(upload) => upload,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                tracing::warn!(error = %e, "upload exceeds the body limit");
                return errors::json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "payload_too_large",
                    "Uploaded file is too large",
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read multipart body");
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    format!("Failed to read upload: {e}"),
                );
            }
        },
        // Not a multipart request at all: nothing was uploaded.
        Err(_) => None,
    };

    match services.submitter.submit(upload).await {
        Ok(receipt) => (StatusCode::OK, Json(dto::UploadResponse::from(receipt))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// First `file` field of the form; other fields are ignored.
async fn read_file_field(
    mut multipart: Multipart,
) -> Result<Option<Upload>, axum::extract::multipart::MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await?;
        return Ok(Some(Upload::new(file_name, content.to_vec())));
    }
    Ok(None)
}

/// `GET /api/job-status?jobId=<id>`: current snapshot of a job.
#[tracing::instrument(skip(services))]
pub async fn job_status(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::JobStatusQuery>,
) -> axum::response::Response {
    match services.status.snapshot(query.job_id.as_deref()).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
