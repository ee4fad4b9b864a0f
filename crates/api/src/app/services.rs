//! Job system wiring: store, sink, processor, supervisor and the two
//! request-facing services built on top of them.

use std::sync::Arc;

use batchflow_infra::jobs::{
    InMemoryJobStore, JobProcessor, JobStatusReporter, JobStore, JobSubmitter, JobSupervisor,
    ProcessorConfig, RecordSink, SimulatedSink, SupervisorConfig,
};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppServices {
    pub submitter: JobSubmitter,
    pub status: JobStatusReporter,
    pub supervisor: JobSupervisor,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn JobStore>,
        sink: Arc<dyn RecordSink>,
        processor: ProcessorConfig,
        supervisor: SupervisorConfig,
    ) -> Self {
        let processor = Arc::new(JobProcessor::new(store.clone(), sink, processor));
        let supervisor = JobSupervisor::new(processor, supervisor);
        Self {
            submitter: JobSubmitter::new(store.clone(), supervisor.clone()),
            status: JobStatusReporter::new(store),
            supervisor,
        }
    }
}

/// Build services from configuration.
///
/// `USE_PERSISTENT_STORES=true` selects Redis when the `redis` feature is
/// compiled in and falls back to in-memory storage otherwise.
pub fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config)?;
    let sink: Arc<dyn RecordSink> = Arc::new(SimulatedSink::new(
        config.sink_latency,
        config.sink_failure_rate,
    ));

    Ok(AppServices::new(
        store,
        sink,
        config.processor.clone(),
        config.supervisor.clone(),
    ))
}

fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            let store = batchflow_infra::jobs::RedisJobStore::new(&config.redis_url)?
                .with_ttl(config.job_ttl);
            tracing::info!(redis_url = %config.redis_url, "using redis job store");
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    Ok(Arc::new(InMemoryJobStore::new()))
}
