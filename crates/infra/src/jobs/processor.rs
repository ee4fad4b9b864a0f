//! Sequential job processor: drives one job from `pending` to a terminal status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, warn};

use batchflow_core::{JobId, JobStatus, Record, TransitionError};

use super::sink::{RecordSink, SinkError};
use super::store::{JobStore, JobStoreError};

/// Processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Persist counts after this many attempted records (and after the last one).
    pub checkpoint_interval: u64,
    /// Pause after every record attempt, to stay under the downstream rate limit.
    pub record_delay: Duration,
    /// Upper bound on a single sink call; exceeding it counts as a failed record.
    pub record_timeout: Duration,
    /// Persist progress at least this often, whatever the checkpoint interval.
    pub heartbeat_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 5,
            record_delay: Duration::from_millis(100),
            record_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl ProcessorConfig {
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn with_record_delay(mut self, delay: Duration) -> Self {
        self.record_delay = delay;
        self
    }

    pub fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Longest a healthy run can go between two writes of the job.
    ///
    /// The heartbeat is checked after each record, so one slow record and its
    /// delay can come on top of the heartbeat interval.
    pub fn max_write_gap(&self) -> Duration {
        self.heartbeat_interval + self.record_timeout + self.record_delay
    }
}

/// Unrecoverable fault that stopped a run.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    /// The job was not `pending`, so this run never owned it.
    #[error("job {id} is {status}, not pending")]
    NotRunnable { id: JobId, status: JobStatus },
    #[error("store: {0}")]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Runs jobs record by record.
///
/// One run per job id at a time; the store's version check turns a violation of
/// that rule into a fault rather than a lost update.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    sink: Arc<dyn RecordSink>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(store: Arc<dyn JobStore>, sink: Arc<dyn RecordSink>, config: ProcessorConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Process a job to completion.
    ///
    /// On a fault the job is marked `failed` with the fault message before the
    /// error is returned; counts keep their last checkpointed values. A job that
    /// is no longer `pending` is left as it is.
    pub async fn run(&self, job_id: JobId) -> Result<JobStatus, ProcessorError> {
        let span = tracing::info_span!("job", job_id = %job_id);
        async move {
            match self.process(job_id).await {
                Ok(status) => Ok(status),
                Err(e @ ProcessorError::NotRunnable { .. }) => {
                    warn!(error = %e, "job not started");
                    Err(e)
                }
                Err(e) => {
                    error!(error = %e, "job processing aborted");
                    self.abort_job(job_id, &e.to_string()).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&self, job_id: JobId) -> Result<JobStatus, ProcessorError> {
        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or(ProcessorError::JobNotFound(job_id))?;

        job.start(Utc::now()).map_err(|e| ProcessorError::NotRunnable {
            id: job_id,
            status: e.from,
        })?;
        self.store.update(&mut job).await?;
        info!(total = job.total_records, "job processing started");

        let interval = self.config.checkpoint_interval.max(1);
        let mut last_write = Instant::now();
        for idx in 0..job.records.len() {
            let outcome = self.apply(&job.records[idx]).await;
            if let Err(e) = &outcome {
                warn!(record = idx, error = %e, "record failed");
            }
            job.record_outcome(outcome.is_ok());

            let attempted = job.attempted();
            if attempted % interval == 0
                || attempted == job.total_records
                || last_write.elapsed() >= self.config.heartbeat_interval
            {
                self.store.update(&mut job).await?;
                last_write = Instant::now();
                debug!(
                    processed = job.processed_records,
                    failed = job.failed_records,
                    "progress checkpointed"
                );
            }

            if !self.config.record_delay.is_zero() {
                tokio::time::sleep(self.config.record_delay).await;
            }
        }

        let status = job.finish(Utc::now())?;
        self.store.update(&mut job).await?;
        self.store.remove_pending(job_id).await?;

        info!(
            status = %status,
            processed = job.processed_records,
            failed = job.failed_records,
            "job finished"
        );
        Ok(status)
    }

    async fn apply(&self, record: &Record) -> Result<(), SinkError> {
        match tokio::time::timeout(self.config.record_timeout, self.sink.apply(record)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.config.record_timeout)),
        }
    }

    /// Mark a job `failed` with `reason`, starting from its last persisted state.
    ///
    /// Best effort: store faults are logged. The id leaves the pending index only
    /// once the job is terminal in the store.
    pub async fn abort_job(&self, job_id: JobId, reason: &str) {
        let mut job = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %job_id, "cannot mark missing job as failed");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to load job for abort");
                return;
            }
        };

        if !job.is_terminal() {
            if let Err(e) = job.abort(reason, Utc::now()) {
                error!(job_id = %job_id, error = %e, "job cannot be aborted");
                return;
            }
            if let Err(e) = self.store.update(&mut job).await {
                error!(job_id = %job_id, error = %e, "failed to persist job failure");
                return;
            }
            info!(job_id = %job_id, reason = %reason, "job marked failed");
        }

        if let Err(e) = self.store.remove_pending(job_id).await {
            warn!(job_id = %job_id, error = %e, "failed to remove job from pending index");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use batchflow_core::Job;

    use crate::jobs::store::InMemoryJobStore;

    /// Sink replaying a fixed script of outcomes, then succeeding.
    struct ScriptedSink {
        script: Mutex<VecDeque<bool>>,
    }

    impl ScriptedSink {
        fn new(script: &[bool]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
            }
        }
    }

    #[async_trait]
    impl RecordSink for ScriptedSink {
        async fn apply(&self, _record: &Record) -> Result<(), SinkError> {
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(SinkError::Rejected("scripted failure".to_string()))
            }
        }
    }

    struct HangingSink;

    #[async_trait]
    impl RecordSink for HangingSink {
        async fn apply(&self, _record: &Record) -> Result<(), SinkError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Store wrapper that records every successful write and can start failing.
    struct ObservedStore {
        inner: InMemoryJobStore,
        writes: Mutex<Vec<Job>>,
        fail_after_writes: Option<usize>,
        update_calls: AtomicUsize,
    }

    impl ObservedStore {
        fn new(fail_after_writes: Option<usize>) -> Self {
            Self {
                inner: InMemoryJobStore::new(),
                writes: Mutex::new(Vec::new()),
                fail_after_writes,
                update_calls: AtomicUsize::new(0),
            }
        }

        fn writes(&self) -> Vec<Job> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobStore for ObservedStore {
        async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
            self.inner.create(job).await
        }

        async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(id).await
        }

        async fn update(&self, job: &mut Job) -> Result<(), JobStoreError> {
            let call = self.update_calls.fetch_add(1, Ordering::SeqCst);
            // The abort write after the injected fault is let through.
            if self.fail_after_writes == Some(call) {
                return Err(JobStoreError::Storage("connection refused".to_string()));
            }
            self.inner.update(job).await?;
            self.writes.lock().unwrap().push(job.clone());
            Ok(())
        }

        async fn add_pending(&self, id: JobId) -> Result<(), JobStoreError> {
            self.inner.add_pending(id).await
        }

        async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError> {
            self.inner.remove_pending(id).await
        }

        async fn pending_ids(&self) -> Result<Vec<JobId>, JobStoreError> {
            self.inner.pending_ids().await
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record {
                name: format!("user{i}"),
                email: format!("user{i}@example.com"),
            })
            .collect()
    }

    fn fast_config() -> ProcessorConfig {
        ProcessorConfig::default().with_record_delay(Duration::ZERO)
    }

    async fn seeded(store: &dyn JobStore, n: usize) -> JobId {
        let job = Job::new(records(n));
        store.create(&job).await.unwrap();
        store.add_pending(job.id).await.unwrap();
        job.id
    }

    #[tokio::test]
    async fn all_successes_complete_the_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = seeded(store.as_ref(), 2).await;
        let processor = JobProcessor::new(store.clone(), Arc::new(ScriptedSink::new(&[])), fast_config());

        let status = processor.run(id).await.unwrap();
        assert_eq!(status, JobStatus::Completed);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.processed_records, 2);
        assert_eq!(job.failed_records, 0);
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
        assert!(job.error.is_none());
        assert!(store.pending_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_failure_still_completes() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = seeded(store.as_ref(), 4).await;
        let sink = ScriptedSink::new(&[true, false, false, true]);
        let processor = JobProcessor::new(store.clone(), Arc::new(sink), fast_config());

        assert_eq!(processor.run(id).await.unwrap(), JobStatus::Completed);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!((job.processed_records, job.failed_records), (2, 2));
    }

    #[tokio::test]
    async fn every_record_failing_fails_the_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = seeded(store.as_ref(), 3).await;
        let sink = ScriptedSink::new(&[false, false, false]);
        let processor = JobProcessor::new(store.clone(), Arc::new(sink), fast_config());

        assert_eq!(processor.run(id).await.unwrap(), JobStatus::Failed);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.processed_records, 0);
        assert_eq!(job.failed_records, 3);
        assert!(job.error.is_none());
        assert!(store.pending_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoints_every_fifth_record_and_after_the_last() {
        let store = Arc::new(ObservedStore::new(None));
        let id = seeded(store.as_ref(), 12).await;
        let processor = JobProcessor::new(store.clone(), Arc::new(ScriptedSink::new(&[])), fast_config());

        processor.run(id).await.unwrap();

        let writes = store.writes();
        let progress: Vec<(JobStatus, u64)> = writes
            .iter()
            .map(|j| (j.status, j.attempted()))
            .collect();
        assert_eq!(
            progress,
            vec![
                (JobStatus::Processing, 0),
                (JobStatus::Processing, 5),
                (JobStatus::Processing, 10),
                (JobStatus::Processing, 12),
                (JobStatus::Completed, 12),
            ]
        );

        // Every observed write respects the count invariant and never regresses.
        for pair in writes.windows(2) {
            assert!(pair[0].attempted() <= pair[1].attempted());
            assert!(pair[1].attempted() <= pair[1].total_records);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_runs_write_a_heartbeat_between_checkpoints() {
        let store = Arc::new(ObservedStore::new(None));
        let id = seeded(store.as_ref(), 5).await;
        let config = ProcessorConfig::default()
            .with_checkpoint_interval(100)
            .with_record_delay(Duration::from_millis(100))
            .with_heartbeat_interval(Duration::from_millis(150));
        let processor = JobProcessor::new(store.clone(), Arc::new(ScriptedSink::new(&[])), config);

        processor.run(id).await.unwrap();

        let progress: Vec<(JobStatus, u64)> = store
            .writes()
            .iter()
            .map(|j| (j.status, j.attempted()))
            .collect();
        assert_eq!(
            progress,
            vec![
                (JobStatus::Processing, 0),
                (JobStatus::Processing, 3),
                (JobStatus::Processing, 5),
                (JobStatus::Completed, 5),
            ]
        );
    }

    #[test]
    fn max_write_gap_covers_one_slow_record() {
        let config = ProcessorConfig::default();
        assert_eq!(config.max_write_gap(), Duration::from_millis(35_100));
    }

    #[tokio::test]
    async fn store_fault_mid_run_fails_job_and_keeps_last_checkpoint() {
        // Writes: 0 = start, 1 = checkpoint at 5, 2 = checkpoint at 10 (fails).
        let store = Arc::new(ObservedStore::new(Some(2)));
        let id = seeded(store.as_ref(), 12).await;
        let processor = JobProcessor::new(store.clone(), Arc::new(ScriptedSink::new(&[])), fast_config());

        let err = processor.run(id).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Store(JobStoreError::Storage(_))));

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed_records, 5);
        assert_eq!(job.error.as_deref(), Some("store: storage error: connection refused"));
        assert!(job.completed_at.is_some());
        assert!(store.pending_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_job_is_a_fault() {
        let store = Arc::new(InMemoryJobStore::new());
        let processor = JobProcessor::new(store, Arc::new(ScriptedSink::new(&[])), fast_config());

        let id = JobId::new();
        assert!(matches!(processor.run(id).await, Err(ProcessorError::JobNotFound(j)) if j == id));
    }

    #[tokio::test]
    async fn second_run_on_a_finished_job_is_rejected() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = seeded(store.as_ref(), 1).await;
        let processor = JobProcessor::new(store.clone(), Arc::new(ScriptedSink::new(&[])), fast_config());

        processor.run(id).await.unwrap();
        let err = processor.run(id).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::NotRunnable { status: JobStatus::Completed, .. }
        ));

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn run_on_a_job_owned_by_another_run_leaves_it_alone() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = seeded(store.as_ref(), 3).await;

        let mut live = store.get(id).await.unwrap().unwrap();
        live.start(Utc::now()).unwrap();
        live.record_outcome(true);
        store.update(&mut live).await.unwrap();

        let processor = JobProcessor::new(store.clone(), Arc::new(ScriptedSink::new(&[])), fast_config());
        let err = processor.run(id).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::NotRunnable { status: JobStatus::Processing, .. }
        ));

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job, live);
        assert_eq!(store.pending_ids().await.unwrap(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_timeout_counts_as_failure() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = seeded(store.as_ref(), 2).await;
        let config = fast_config().with_record_timeout(Duration::from_millis(50));
        let processor = JobProcessor::new(store.clone(), Arc::new(HangingSink), config);

        assert_eq!(processor.run(id).await.unwrap(), JobStatus::Failed);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.failed_records, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn inter_record_delay_is_enforced() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = seeded(store.as_ref(), 3).await;
        let config = ProcessorConfig::default().with_record_delay(Duration::from_millis(100));
        let processor = JobProcessor::new(store, Arc::new(ScriptedSink::new(&[])), config);

        let started = tokio::time::Instant::now();
        processor.run(id).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
