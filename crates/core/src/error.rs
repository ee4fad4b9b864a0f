//! Error taxonomy shared by every layer.

use thiserror::Error;

/// Result type used by job submission and status lookups.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Caller-facing error.
///
/// Three categories matter to callers: validation problems they can fix,
/// lookups of jobs that do not exist, and internal faults they cannot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed or empty input; nothing was created.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The job id parameter was absent or empty.
    #[error("job id is required")]
    MissingJobId,

    /// No job exists for the requested id.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Store unavailable or another unexpected fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Rejected job state transition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: crate::JobStatus,
    pub to: crate::JobStatus,
}
