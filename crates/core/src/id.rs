//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;

/// Identifier of a submitted batch job.
///
/// Opaque to callers; UUIDv7 so ids sort by creation time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Key of the persisted job object.
    pub fn store_key(&self) -> String {
        format!("job:{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = ServiceError;

    /// Anything that is not a UUID cannot name a job, so it is reported as not found.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s)
            .map(Self)
            .map_err(|_| ServiceError::not_found(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_round_trip_through_strings() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);

        let parsed: JobId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn garbage_id_is_not_found() {
        let err = "not-a-uuid".parse::<JobId>().unwrap_err();
        assert_eq!(err, ServiceError::not_found("not-a-uuid"));
    }

    #[test]
    fn store_key_is_prefixed() {
        let id = JobId::new();
        assert_eq!(id.store_key(), format!("job:{id}"));
    }
}
