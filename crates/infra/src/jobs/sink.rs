//! Per-record side effects.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use batchflow_core::Record;

/// Why a record could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("record rejected: {0}")]
    Rejected(String),
    #[error("record timed out after {0:?}")]
    Timeout(Duration),
}

/// Downstream capability applied once per record.
///
/// A single attempt is made per record; failures are counted, never retried.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn apply(&self, record: &Record) -> Result<(), SinkError>;
}

/// Stand-in for a downstream user-creation API: fixed latency, random failures.
#[derive(Debug, Clone)]
pub struct SimulatedSink {
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedSink {
    /// `failure_rate` is clamped to `0.0..=1.0`.
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self {
            latency,
            failure_rate,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for SimulatedSink {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 0.1)
    }
}

#[async_trait]
impl RecordSink for SimulatedSink {
    async fn apply(&self, record: &Record) -> Result<(), SinkError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(SinkError::Rejected("API call failed".to_string()));
        }

        tracing::info!(name = %record.name, email = %record.email, "user added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn zero_failure_rate_always_succeeds() {
        let sink = SimulatedSink::new(Duration::ZERO, 0.0);
        for _ in 0..50 {
            assert!(sink.apply(&record()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn full_failure_rate_always_fails() {
        let sink = SimulatedSink::new(Duration::ZERO, 1.0);
        assert_eq!(
            sink.apply(&record()).await,
            Err(SinkError::Rejected("API call failed".to_string()))
        );
    }

    #[test]
    fn failure_rate_is_clamped() {
        assert_eq!(SimulatedSink::new(Duration::ZERO, 7.0).failure_rate(), 1.0);
        assert_eq!(SimulatedSink::new(Duration::ZERO, -1.0).failure_rate(), 0.0);
        assert_eq!(SimulatedSink::new(Duration::ZERO, f64::NAN).failure_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied() {
        let sink = SimulatedSink::new(Duration::from_millis(500), 0.0);
        let started = tokio::time::Instant::now();
        sink.apply(&record()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
