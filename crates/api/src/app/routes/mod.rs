use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

pub mod jobs;
pub mod system;

/// Router for the `/api` endpoints.
pub fn router(max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/upload",
            post(jobs::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/job-status", get(jobs::job_status))
}
