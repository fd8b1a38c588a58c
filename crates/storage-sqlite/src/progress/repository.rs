use async_trait::async_trait;
use diesel::prelude::*;
use std::sync::Arc;

use super::model::{ProgressDB, PROGRESS_ROW_ID};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::progress;
use ledgersync_core::errors::Result;
use ledgersync_core::progress::{ProgressRepositoryTrait, StoredProgress};
use ledgersync_core::utils::time_utils::now_ms;

pub struct ProgressRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl ProgressRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl ProgressRepositoryTrait for ProgressRepository {
    fn load(&self) -> Result<StoredProgress> {
        let mut conn = get_connection(&self.pool)?;
        let row = progress::table
            .find(PROGRESS_ROW_ID)
            .select(ProgressDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(StoredProgress::from).unwrap_or_default())
    }

    async fn save(&self, value: StoredProgress) -> Result<()> {
        let row = ProgressDB::new(&value, now_ms());
        self.writer
            .exec(move |conn| {
                diesel::replace_into(progress::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
