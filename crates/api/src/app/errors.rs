use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use batchflow_core::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::MissingJobId => {
            json_error(StatusCode::BAD_REQUEST, "missing_job_id", "Job ID is required")
        }
        ServiceError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "Job not found"),
        ServiceError::Internal(detail) => {
            tracing::error!(error = %detail, "request failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
