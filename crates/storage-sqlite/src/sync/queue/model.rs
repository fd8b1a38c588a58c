//! Database models for sync run jobs.

use chrono::{NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;

use ledgersync_core::collections::Collection;
use ledgersync_core::errors::Result;
use ledgersync_core::sync::SyncQueueJob;

#[derive(Queryable, Selectable, Identifiable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncQueueDB {
    pub id: i64,
    pub state: String,
    pub requested_collections: String,
    pub owner_user_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_queue)]
pub struct NewSyncQueueDB {
    pub state: String,
    pub requested_collections: String,
    pub owner_user_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NewSyncQueueDB {
    pub fn new(owner_user_id: Option<i64>, collections: &[Collection]) -> Result<Self> {
        let now = Utc::now().naive_utc();
        Ok(Self {
            state: "NEW".to_string(),
            requested_collections: serde_json::to_string(collections)?,
            owner_user_id,
            created_at: now,
            updated_at: now,
        })
    }
}

impl SyncQueueDB {
    pub fn into_domain(self) -> Result<SyncQueueJob> {
        Ok(SyncQueueJob {
            id: self.id,
            state: self.state.parse()?,
            requested_collections: serde_json::from_str(&self.requested_collections)?,
            owner_user_id: self.owner_user_id,
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}
