//! Database models for sync step records.

use diesel::prelude::*;

use ledgersync_core::errors::Result;
use ledgersync_core::sync::{SyncPartition, SyncUserStep};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_user_steps)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncUserStepDB {
    pub _id: i64,
    pub collection: String,
    pub user_id: Option<i64>,
    pub sub_user_id: Option<i64>,
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub base_start: Option<i64>,
    pub base_end: Option<i64>,
    pub curr_start: Option<i64>,
    pub curr_end: Option<i64>,
    pub is_base_step_ready: bool,
    pub is_curr_step_ready: bool,
    pub synced_at: Option<i64>,
}

/// Insert and update payload. Every field is written, `None` included.
#[derive(Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_user_steps)]
#[diesel(treat_none_as_null = true)]
pub struct SyncUserStepWriteDB {
    pub collection: String,
    pub user_id: Option<i64>,
    pub sub_user_id: Option<i64>,
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub base_start: Option<i64>,
    pub base_end: Option<i64>,
    pub curr_start: Option<i64>,
    pub curr_end: Option<i64>,
    pub is_base_step_ready: bool,
    pub is_curr_step_ready: bool,
    pub synced_at: Option<i64>,
}

impl SyncUserStepWriteDB {
    pub fn new(partition: &SyncPartition, step: &SyncUserStep) -> Self {
        Self {
            collection: partition.collection.table_name().to_string(),
            user_id: partition.user_id,
            sub_user_id: partition.sub_user_id,
            symbol: partition.symbol.clone(),
            timeframe: partition.timeframe.clone(),
            base_start: step.base_start,
            base_end: step.base_end,
            curr_start: step.curr_start,
            curr_end: step.curr_end,
            is_base_step_ready: step.is_base_step_ready,
            is_curr_step_ready: step.is_curr_step_ready,
            synced_at: step.synced_at,
        }
    }
}

impl SyncUserStepDB {
    pub fn step(&self) -> SyncUserStep {
        SyncUserStep {
            base_start: self.base_start,
            base_end: self.base_end,
            curr_start: self.curr_start,
            curr_end: self.curr_end,
            is_base_step_ready: self.is_base_step_ready,
            is_curr_step_ready: self.is_curr_step_ready,
            synced_at: self.synced_at,
        }
    }

    pub fn partition(&self) -> Result<SyncPartition> {
        Ok(SyncPartition {
            collection: self.collection.parse()?,
            user_id: self.user_id,
            sub_user_id: self.sub_user_id,
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
        })
    }
}
