//! Per-partition sync windows.
//!
//! Every (collection, user, sub-user, symbol, timeframe) partition tracks two
//! windows: the *base* window backfills history toward a floor timestamp, the
//! *current* window syncs forward from the last confirmed point. A window end
//! of `None` is open up to "now".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collections::{Collection, CollectionSchema};
use crate::errors::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPartition {
    pub collection: Collection,
    pub user_id: Option<i64>,
    pub sub_user_id: Option<i64>,
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
}

impl SyncPartition {
    pub fn for_user(collection: Collection, user_id: i64) -> Self {
        Self {
            collection,
            user_id: Some(user_id),
            sub_user_id: None,
            symbol: None,
            timeframe: None,
        }
    }

    pub fn for_symbol(collection: Collection, symbol: &str, timeframe: &str) -> Self {
        Self {
            collection,
            user_id: None,
            sub_user_id: None,
            symbol: Some(symbol.to_string()),
            timeframe: Some(timeframe.to_string()),
        }
    }

    pub fn with_sub_user(mut self, sub_user_id: i64) -> Self {
        self.sub_user_id = Some(sub_user_id);
        self
    }
}

/// Persisted step record of one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUserStep {
    pub base_start: Option<i64>,
    pub base_end: Option<i64>,
    pub curr_start: Option<i64>,
    pub curr_end: Option<i64>,
    pub is_base_step_ready: bool,
    pub is_curr_step_ready: bool,
    pub synced_at: Option<i64>,
}

fn collapsed(start: Option<i64>, end: Option<i64>) -> bool {
    matches!((start, end), (Some(s), Some(e)) if s >= e)
}

impl SyncUserStep {
    pub fn is_base_ready(&self) -> bool {
        self.is_base_step_ready || collapsed(self.base_start, self.base_end)
    }

    pub fn is_curr_ready(&self) -> bool {
        self.is_curr_step_ready || collapsed(self.curr_start, self.curr_end)
    }

    pub fn is_ready(&self) -> bool {
        self.is_base_ready() && self.is_curr_ready()
    }
}

/// Oldest/newest event timestamps actually present for a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservedBounds {
    pub first_main: Option<i64>,
    pub last_main: Option<i64>,
    pub first_staging: Option<i64>,
    pub last_staging: Option<i64>,
}

impl ObservedBounds {
    pub fn is_main_empty(&self) -> bool {
        self.first_main.is_none() && self.last_main.is_none()
    }

    pub fn is_staging_empty(&self) -> bool {
        self.first_staging.is_none() && self.last_staging.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSyncedInfo {
    pub step: SyncUserStep,
    /// Newest event timestamp across main and staging, 0 when empty.
    pub last_elem_mts: i64,
    pub is_full_history: bool,
}

fn min_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Reconciles the claimed windows of `record` with the data that is actually
/// stored. Pure, so repeated calls over unchanged storage agree.
pub fn reconcile_last_synced(
    schema: &CollectionSchema,
    record: Option<&SyncUserStep>,
    bounds: &ObservedBounds,
) -> Result<LastSyncedInfo> {
    if schema.date_field.is_none() {
        return Err(SyncError::LastSyncedInfoGetting(schema.table_name.to_string()).into());
    }

    let last_elem_mts = max_opt(bounds.last_staging, bounds.last_main).unwrap_or(0);

    if schema.is_mutable {
        return Ok(LastSyncedInfo {
            step: SyncUserStep {
                base_start: Some(0),
                ..SyncUserStep::default()
            },
            last_elem_mts,
            is_full_history: true,
        });
    }

    let mut step = record.cloned().unwrap_or_default();

    if !step.is_base_step_ready && bounds.is_main_empty() && bounds.is_staging_empty() {
        step.base_start = step.base_start.or(Some(0));
        return Ok(LastSyncedInfo {
            step,
            last_elem_mts,
            is_full_history: false,
        });
    }

    if !step.is_curr_step_ready {
        step.curr_start = min_opt(step.curr_start, bounds.last_main).or(Some(0));
        step.curr_end = min_opt(step.curr_end, bounds.first_staging).or(bounds.last_main);
    }
    if !step.is_base_step_ready {
        step.base_start = min_opt(step.base_start, bounds.first_main).or(Some(0));
        step.base_end = min_opt(step.base_end, bounds.first_staging).or(bounds.last_main);
    }

    Ok(LastSyncedInfo {
        step,
        last_elem_mts,
        is_full_history: false,
    })
}

#[async_trait]
pub trait SyncUserStepRepositoryTrait: Send + Sync {
    fn get_step(&self, partition: &SyncPartition) -> Result<Option<SyncUserStep>>;

    /// Bounds over main and, when `run_id` is set and its table exists, staging.
    fn get_observed_bounds(
        &self,
        partition: &SyncPartition,
        run_id: Option<i64>,
    ) -> Result<ObservedBounds>;

    fn get_steps_for_user(&self, user_id: i64) -> Result<Vec<(SyncPartition, SyncUserStep)>>;

    async fn upsert_step(&self, partition: SyncPartition, step: SyncUserStep) -> Result<()>;

    async fn delete_for_user(&self, user_id: i64) -> Result<usize>;
}
