//! Runtime configuration, read from environment variables.
//!
//! Every setting has a default; a value that fails to parse is logged and
//! replaced by the default rather than aborting startup.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use batchflow_infra::jobs::{ProcessorConfig, SupervisorConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Use Redis instead of the in-memory job store (needs the `redis` feature).
    pub use_persistent_stores: bool,
    pub redis_url: String,
    /// Expiry for terminal jobs in Redis; `None` keeps them forever.
    pub job_ttl: Option<Duration>,
    pub processor: ProcessorConfig,
    pub supervisor: SupervisorConfig,
    pub sink_latency: Duration,
    pub sink_failure_rate: f64,
    /// Largest accepted upload request body.
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            use_persistent_stores: false,
            redis_url: "redis://localhost:6379".to_string(),
            job_ttl: None,
            processor: ProcessorConfig::default(),
            supervisor: SupervisorConfig::default(),
            sink_latency: Duration::from_millis(500),
            sink_failure_rate: 0.1,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let env = Env { lookup };

        let processor = ProcessorConfig::default()
            .with_checkpoint_interval(env.parse(
                "CHECKPOINT_INTERVAL",
                defaults.processor.checkpoint_interval,
            ))
            .with_record_delay(env.millis("RECORD_DELAY_MS", defaults.processor.record_delay))
            .with_record_timeout(env.millis("RECORD_TIMEOUT_MS", defaults.processor.record_timeout))
            .with_heartbeat_interval(env.secs(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.processor.heartbeat_interval,
            ));

        let supervisor = SupervisorConfig::default()
            .with_max_concurrent_jobs(env.parse(
                "MAX_CONCURRENT_JOBS",
                defaults.supervisor.max_concurrent_jobs,
            ))
            .with_stall_timeout(stall_timeout(
                env.secs("STALL_TIMEOUT_SECS", defaults.supervisor.stall_timeout),
                &processor,
            ));

        Self {
            bind_addr: env.parse("BIND_ADDR", defaults.bind_addr),
            use_persistent_stores: env.parse("USE_PERSISTENT_STORES", defaults.use_persistent_stores),
            redis_url: env.get("REDIS_URL").unwrap_or(defaults.redis_url),
            job_ttl: env
                .get("JOB_TTL_SECS")
                .and_then(|raw| parse_or_warn::<u64>("JOB_TTL_SECS", &raw))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            processor,
            supervisor,
            sink_latency: env.millis("SINK_LATENCY_MS", defaults.sink_latency),
            sink_failure_rate: env.parse("SINK_FAILURE_RATE", defaults.sink_failure_rate),
            max_upload_bytes: env.parse("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        }
    }
}

/// A live run must never look stalled: the timeout has to exceed the longest
/// gap between two writes of a healthy run. Shorter values are raised to twice
/// that gap.
fn stall_timeout(requested: Duration, processor: &ProcessorConfig) -> Duration {
    let gap = processor.max_write_gap();
    if requested > gap {
        return requested;
    }
    let raised = gap * 2;
    tracing::warn!(
        requested_secs = requested.as_secs_f64(),
        raised_secs = raised.as_secs_f64(),
        "STALL_TIMEOUT_SECS does not exceed the longest write gap of a healthy run; raising it"
    );
    raised
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|raw| parse_or_warn(key, &raw))
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|raw| parse_or_warn::<u64>(key, &raw))
            .map(Duration::from_millis)
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|raw| parse_or_warn::<u64>(key, &raw))
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = raw, "invalid config value; using default");
            None
        }
    }
}
