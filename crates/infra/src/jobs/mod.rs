//! Batch job system: storage, record sink, processor, supervision and the
//! two entry points callers use (submission and status lookups).
//!
//! ## Components
//!
//! - `JobStore`: job persistence and the pending-job index (in-memory or Redis)
//! - `RecordSink`: per-record side effect, with a simulated downstream API
//! - `JobProcessor`: runs one job record by record, checkpointing progress
//! - `JobSupervisor`: spawns runs, bounds concurrency, fails panicked/stalled jobs
//! - `JobSubmitter` / `JobStatusReporter`: submission and polling

pub mod processor;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod sink;
pub mod status;
pub mod store;
pub mod submission;
pub mod supervisor;

pub use processor::{JobProcessor, ProcessorConfig, ProcessorError};
#[cfg(feature = "redis")]
pub use redis_store::RedisJobStore;
pub use sink::{RecordSink, SimulatedSink, SinkError};
pub use status::JobStatusReporter;
pub use store::{InMemoryJobStore, JobStore, JobStoreError, PENDING_INDEX_KEY};
pub use submission::{JobSubmitter, SubmissionReceipt, Upload};
pub use supervisor::{JobSupervisor, RecoveryReport, SupervisorConfig};
