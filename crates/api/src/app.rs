//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: job system wiring (store, sink, processor, supervisor)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// `max_upload_bytes` bounds the request body of `POST /api/upload`.
pub fn build_app(services: Arc<AppServices>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", routes::router(max_upload_bytes))
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
