//! `batchflow-core`: batch job domain.
//!
//! Pure domain code: records and their acceptance rules, the job state machine,
//! and the caller-facing error taxonomy. No I/O lives here.

pub mod error;
pub mod id;
pub mod job;
pub mod record;

pub use error::{ServiceError, ServiceResult, TransitionError};
pub use id::JobId;
pub use job::{Job, JobSnapshot, JobStatus};
pub use record::{Record, is_valid_email, validate_csv};
