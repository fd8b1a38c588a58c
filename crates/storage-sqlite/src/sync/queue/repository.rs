use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::{Sqlite, SqliteConnection};
use log::debug;
use std::sync::Arc;

use super::model::{NewSyncQueueDB, SyncQueueDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_queue;
use ledgersync_core::collections::Collection;
use ledgersync_core::errors::{Result, SyncError, ValidationError};
use ledgersync_core::sync::{LockOutcome, SyncQueueJob, SyncQueueRepositoryTrait, SyncQueueState};

const ACTIVE_STATES: [&str; 3] = ["NEW", "LOCKED", "ERROR"];

pub struct SyncQueueRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncQueueRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn owned_by<'a>(owner_user_id: Option<i64>) -> sync_queue::BoxedQuery<'a, Sqlite> {
    let query = sync_queue::table.into_boxed();
    match owner_user_id {
        Some(owner) => query.filter(sync_queue::owner_user_id.eq(owner)),
        None => query.filter(sync_queue::owner_user_id.is_null()),
    }
}

fn find_job(conn: &mut SqliteConnection, job_id: i64) -> Result<SyncQueueDB> {
    sync_queue::table
        .find(job_id)
        .select(SyncQueueDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .ok_or_else(|| SyncError::JobNotFound(job_id).into())
}

fn locked_for_owner(
    conn: &mut SqliteConnection,
    owner_user_id: Option<i64>,
) -> Result<Option<SyncQueueDB>> {
    Ok(owned_by(owner_user_id)
        .filter(sync_queue::state.eq(SyncQueueState::Locked.as_str()))
        .order(sync_queue::id.asc())
        .select(SyncQueueDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?)
}

fn set_state(conn: &mut SqliteConnection, job_id: i64, state: SyncQueueState) -> Result<SyncQueueDB> {
    let updated = diesel::update(sync_queue::table.find(job_id))
        .set((
            sync_queue::state.eq(state.as_str()),
            sync_queue::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    if updated == 0 {
        return Err(SyncError::JobNotFound(job_id).into());
    }
    find_job(conn, job_id)
}

#[async_trait]
impl SyncQueueRepositoryTrait for SyncQueueRepository {
    async fn create(
        &self,
        owner_user_id: Option<i64>,
        collections: Vec<Collection>,
    ) -> Result<SyncQueueJob> {
        let new_job = NewSyncQueueDB::new(owner_user_id, &collections)?;
        self.writer
            .exec(move |conn| {
                let created = diesel::insert_into(sync_queue::table)
                    .values(&new_job)
                    .returning(SyncQueueDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                debug!("Created sync job {} for owner {:?}", created.id, owner_user_id);
                created.into_domain()
            })
            .await
    }

    async fn try_lock(&self, job_id: i64) -> Result<LockOutcome> {
        self.writer
            .exec(move |conn| {
                let job = find_job(conn, job_id)?;
                let state: SyncQueueState = job.state.parse()?;

                if state == SyncQueueState::Locked {
                    return Ok(LockOutcome::Busy(job.into_domain()?));
                }
                if state == SyncQueueState::Done {
                    return Err(ValidationError::InvalidInput(format!(
                        "sync job {} is already DONE",
                        job_id
                    ))
                    .into());
                }

                if let Some(running) = locked_for_owner(conn, job.owner_user_id)? {
                    return Ok(LockOutcome::Busy(running.into_domain()?));
                }

                let locked = set_state(conn, job_id, SyncQueueState::Locked)?;
                Ok(LockOutcome::Locked(locked.into_domain()?))
            })
            .await
    }

    async fn update_state(&self, job_id: i64, state: SyncQueueState) -> Result<SyncQueueJob> {
        self.writer
            .exec(move |conn| set_state(conn, job_id, state)?.into_domain())
            .await
    }

    async fn delete_new(&self, job_id: i64) -> Result<bool> {
        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    sync_queue::table
                        .filter(sync_queue::id.eq(job_id))
                        .filter(sync_queue::state.eq(SyncQueueState::New.as_str())),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(deleted > 0)
            })
            .await
    }

    fn get(&self, job_id: i64) -> Result<Option<SyncQueueJob>> {
        let mut conn = get_connection(&self.pool)?;
        sync_queue::table
            .find(job_id)
            .select(SyncQueueDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(SyncQueueDB::into_domain)
            .transpose()
    }

    fn get_locked_for_owner(&self, owner_user_id: Option<i64>) -> Result<Option<SyncQueueJob>> {
        let mut conn = get_connection(&self.pool)?;
        locked_for_owner(&mut conn, owner_user_id)?
            .map(SyncQueueDB::into_domain)
            .transpose()
    }

    fn get_active_run_ids(&self) -> Result<Vec<i64>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(sync_queue::table
            .filter(sync_queue::state.eq_any(ACTIVE_STATES))
            .select(sync_queue::id)
            .order(sync_queue::id.asc())
            .load::<i64>(&mut conn)
            .map_err(StorageError::from)?)
    }
}
