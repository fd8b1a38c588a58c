//! Sync run jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::collections::Collection;
use crate::errors::{Error, Result, ValidationError};

/// State of a sync run job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncQueueState {
    /// Requested, or interrupted and waiting to resume
    New,
    /// Running; at most one per owner
    Locked,
    /// Failed; kept for resume
    Error,
    /// Merged successfully
    Done,
}

impl SyncQueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncQueueState::New => "NEW",
            SyncQueueState::Locked => "LOCKED",
            SyncQueueState::Error => "ERROR",
            SyncQueueState::Done => "DONE",
        }
    }

    /// Jobs in these states still own their staging tables.
    pub fn keeps_staging(&self) -> bool {
        !matches!(self, SyncQueueState::Done)
    }
}

impl fmt::Display for SyncQueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncQueueState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(SyncQueueState::New),
            "LOCKED" => Ok(SyncQueueState::Locked),
            "ERROR" => Ok(SyncQueueState::Error),
            "DONE" => Ok(SyncQueueState::Done),
            other => Err(ValidationError::InvalidInput(format!(
                "unknown sync queue state '{other}'"
            ))
            .into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueJob {
    pub id: i64,
    pub state: SyncQueueState,
    pub requested_collections: Vec<Collection>,
    pub owner_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of trying to lock a NEW job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Locked(SyncQueueJob),
    /// The owner already holds this LOCKED job.
    Busy(SyncQueueJob),
}

#[async_trait]
pub trait SyncQueueRepositoryTrait: Send + Sync {
    async fn create(
        &self,
        owner_user_id: Option<i64>,
        collections: Vec<Collection>,
    ) -> Result<SyncQueueJob>;

    /// Moves `job_id` to LOCKED unless its owner already holds a LOCKED job.
    /// The check and the update happen in one write transaction.
    async fn try_lock(&self, job_id: i64) -> Result<LockOutcome>;

    async fn update_state(&self, job_id: i64, state: SyncQueueState) -> Result<SyncQueueJob>;

    /// Deletes `job_id` if it is still NEW. Returns whether a row was removed.
    async fn delete_new(&self, job_id: i64) -> Result<bool>;

    fn get(&self, job_id: i64) -> Result<Option<SyncQueueJob>>;

    fn get_locked_for_owner(&self, owner_user_id: Option<i64>) -> Result<Option<SyncQueueJob>>;

    /// Ids of NEW, LOCKED and ERROR jobs.
    fn get_active_run_ids(&self) -> Result<Vec<i64>>;
}
