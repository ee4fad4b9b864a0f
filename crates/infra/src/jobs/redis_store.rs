//! Redis-backed job store.
//!
//! - Jobs live under `job:<id>` as camelCase JSON
//! - The pending index is the list `csv_processing_jobs`, kept duplicate-free
//! - `update` is a compare-and-set on the stored `version`, done in a Lua script
//! - Terminal jobs optionally expire after a configured TTL

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use tracing::instrument;

use batchflow_core::{Job, JobId};

use super::store::{JobStore, JobStoreError, PENDING_INDEX_KEY};

/// Returns `{0, 0}` when the key is missing, `{1, found}` on a version
/// mismatch, `{2, found}` after writing.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return {0, 0}
end
local found = tonumber(cjson.decode(current)['version']) or 0
if found ~= tonumber(ARGV[1]) then
  return {1, found}
end
local ttl = tonumber(ARGV[3])
if ttl > 0 then
  redis.call('SET', KEYS[1], ARGV[2], 'EX', ttl)
else
  redis.call('SET', KEYS[1], ARGV[2])
end
return {2, found}
"#;

#[derive(Debug, Clone)]
pub struct RedisJobStore {
    client: redis::Client,
    ttl: Option<Duration>,
}

impl RedisJobStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, JobStoreError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(storage)?;
        Ok(Self { client, ttl: None })
    }

    /// Expire terminal jobs this long after their final write.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|t| !t.is_zero());
        self
    }

    async fn conn(&self) -> Result<MultiplexedConnection, JobStoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage)
    }
}

fn storage(e: impl std::fmt::Display) -> JobStoreError {
    JobStoreError::Storage(e.to_string())
}

#[async_trait]
impl JobStore for RedisJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
        let payload = serde_json::to_string(job).map_err(storage)?;
        let mut conn = self.conn().await?;

        let written: Option<String> = redis::cmd("SET")
            .arg(job.id.store_key())
            .arg(payload)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(storage)?;

        match written {
            Some(_) => Ok(()),
            None => Err(JobStoreError::AlreadyExists(job.id)),
        }
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = redis::cmd("GET")
            .arg(id.store_key())
            .query_async(&mut conn)
            .await
            .map_err(storage)?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(storage))
            .transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, version = job.version), err)]
    async fn update(&self, job: &mut Job) -> Result<(), JobStoreError> {
        let mut next = job.clone();
        next.version += 1;
        next.updated_at = Utc::now();

        let payload = serde_json::to_string(&next).map_err(storage)?;
        let ttl_secs = match self.ttl {
            Some(ttl) if next.is_terminal() => ttl.as_secs().max(1),
            _ => 0,
        };

        let mut conn = self.conn().await?;
        let (code, found): (i64, i64) = redis::Script::new(CAS_SCRIPT)
            .key(job.id.store_key())
            .arg(job.version)
            .arg(payload)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(storage)?;

        match code {
            0 => Err(JobStoreError::NotFound(job.id)),
            1 => Err(JobStoreError::Conflict {
                id: job.id,
                expected: job.version,
                found: found.max(0) as u64,
            }),
            _ => {
                *job = next;
                Ok(())
            }
        }
    }

    async fn add_pending(&self, id: JobId) -> Result<(), JobStoreError> {
        let member = id.to_string();
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(PENDING_INDEX_KEY)
            .arg(0)
            .arg(&member)
            .ignore()
            .cmd("RPUSH")
            .arg(PENDING_INDEX_KEY)
            .arg(&member)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(storage)
    }

    async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("LREM")
            .arg(PENDING_INDEX_KEY)
            .arg(0)
            .arg(id.to_string())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(storage)
    }

    async fn pending_ids(&self) -> Result<Vec<JobId>, JobStoreError> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = redis::cmd("LRANGE")
            .arg(PENDING_INDEX_KEY)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(storage)?;

        // Entries that do not parse cannot name a job; skip them.
        Ok(members.iter().filter_map(|m| m.parse().ok()).collect())
    }
}
