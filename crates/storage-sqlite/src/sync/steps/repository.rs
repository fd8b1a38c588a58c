use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::sqlite::{Sqlite, SqliteConnection};
use std::sync::Arc;

use super::model::{SyncUserStepDB, SyncUserStepWriteDB};
use crate::db::{get_connection, table_exists, DbPool, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::sync_user_steps;
use crate::utils::quote_ident;
use ledgersync_core::errors::{Result, SyncError};
use ledgersync_core::sync::{
    staging_table_name, ObservedBounds, SyncPartition, SyncUserStep, SyncUserStepRepositoryTrait,
};

pub struct SyncUserStepRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncUserStepRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// Exact match on every partition key, `NULL` matching `NULL`.
fn partition_query<'a>(partition: &'a SyncPartition) -> sync_user_steps::BoxedQuery<'a, Sqlite> {
    let mut query = sync_user_steps::table
        .into_boxed()
        .filter(sync_user_steps::collection.eq(partition.collection.table_name()));

    query = match partition.user_id {
        Some(v) => query.filter(sync_user_steps::user_id.eq(v)),
        None => query.filter(sync_user_steps::user_id.is_null()),
    };
    query = match partition.sub_user_id {
        Some(v) => query.filter(sync_user_steps::sub_user_id.eq(v)),
        None => query.filter(sync_user_steps::sub_user_id.is_null()),
    };
    query = match partition.symbol.as_deref() {
        Some(v) => query.filter(sync_user_steps::symbol.eq(v)),
        None => query.filter(sync_user_steps::symbol.is_null()),
    };
    match partition.timeframe.as_deref() {
        Some(v) => query.filter(sync_user_steps::timeframe.eq(v)),
        None => query.filter(sync_user_steps::timeframe.is_null()),
    }
}

#[derive(QueryableByName)]
struct BoundsRow {
    #[diesel(sql_type = Nullable<BigInt>)]
    first_mts: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    last_mts: Option<i64>,
}

/// MIN/MAX of the date field over the partition's rows of `table`.
fn table_bounds(
    conn: &mut SqliteConnection,
    table: &str,
    partition: &SyncPartition,
) -> Result<(Option<i64>, Option<i64>)> {
    let schema = partition.collection.schema();
    let date_field = schema
        .date_field
        .ok_or_else(|| SyncError::LastSyncedInfoGetting(schema.table_name.to_string()))?;

    if !table_exists(conn, table)? {
        return Ok((None, None));
    }

    let mut conditions = Vec::new();
    if schema.has_user {
        conditions.push("user_id = ?".to_string());
    }
    // Without a sub-user the partition spans all of the user's rows.
    let sub_user_id = partition.sub_user_id.filter(|_| schema.has_sub_user);
    if sub_user_id.is_some() {
        conditions.push("sub_user_id = ?".to_string());
    }
    let symbol = match (schema.symbol_field, partition.symbol.as_deref()) {
        (Some(field), Some(symbol)) => {
            conditions.push(format!("{} = ?", quote_ident(field)));
            Some(symbol)
        }
        _ => None,
    };
    let timeframe = match (schema.timeframe_field, partition.timeframe.as_deref()) {
        (Some(field), Some(timeframe)) => {
            conditions.push(format!("{} = ?", quote_ident(field)));
            Some(timeframe)
        }
        _ => None,
    };

    let mut sql = format!(
        "SELECT MIN({date}) AS first_mts, MAX({date}) AS last_mts FROM {table}",
        date = quote_ident(date_field),
        table = quote_ident(table)
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    let mut query = diesel::sql_query(sql).into_boxed::<Sqlite>();
    if schema.has_user {
        query = query.bind::<Nullable<BigInt>, _>(partition.user_id);
    }
    if let Some(sub_user_id) = sub_user_id {
        query = query.bind::<BigInt, _>(sub_user_id);
    }
    if let Some(symbol) = symbol {
        query = query.bind::<Text, _>(symbol.to_string());
    }
    if let Some(timeframe) = timeframe {
        query = query.bind::<Text, _>(timeframe.to_string());
    }

    let row: BoundsRow = query.get_result(conn).into_core()?;
    Ok((row.first_mts, row.last_mts))
}

#[async_trait]
impl SyncUserStepRepositoryTrait for SyncUserStepRepository {
    fn get_step(&self, partition: &SyncPartition) -> Result<Option<SyncUserStep>> {
        let mut conn = get_connection(&self.pool)?;
        let record = partition_query(partition)
            .select(SyncUserStepDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(record.map(|r| r.step()))
    }

    fn get_observed_bounds(
        &self,
        partition: &SyncPartition,
        run_id: Option<i64>,
    ) -> Result<ObservedBounds> {
        let mut conn = get_connection(&self.pool)?;

        let (first_main, last_main) =
            table_bounds(&mut conn, partition.collection.table_name(), partition)?;
        let (first_staging, last_staging) = match run_id {
            Some(run_id) => table_bounds(
                &mut conn,
                &staging_table_name(run_id, partition.collection),
                partition,
            )?,
            None => (None, None),
        };

        Ok(ObservedBounds {
            first_main,
            last_main,
            first_staging,
            last_staging,
        })
    }

    fn get_steps_for_user(&self, user_id: i64) -> Result<Vec<(SyncPartition, SyncUserStep)>> {
        let mut conn = get_connection(&self.pool)?;
        let records = sync_user_steps::table
            .filter(sync_user_steps::user_id.eq(user_id))
            .order(sync_user_steps::_id.asc())
            .select(SyncUserStepDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?;

        records
            .into_iter()
            .map(|r| Ok((r.partition()?, r.step())))
            .collect()
    }

    async fn upsert_step(&self, partition: SyncPartition, step: SyncUserStep) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = SyncUserStepWriteDB::new(&partition, &step);
                let existing: Option<i64> = partition_query(&partition)
                    .select(sync_user_steps::_id)
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                match existing {
                    Some(id) => {
                        diesel::update(sync_user_steps::table.find(id))
                            .set(&row)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    None => {
                        diesel::insert_into(sync_user_steps::table)
                            .values(&row)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                }
                Ok(())
            })
            .await
    }

    async fn delete_for_user(&self, user_id: i64) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                Ok(diesel::delete(
                    sync_user_steps::table.filter(sync_user_steps::user_id.eq(user_id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{create_collection_table, CollectionRepository};
    use crate::test_support::setup_db;
    use ledgersync_core::collections::Collection;
    use ledgersync_core::sync::SyncStepTracker;
    use serde_json::json;

    fn ledger(id: i64, mts: i64, user_id: i64) -> serde_json::Value {
        json!({ "id": id, "currency": "BTC", "mts": mts, "amount": "1", "user_id": user_id })
    }

    #[tokio::test]
    async fn test_upsert_replaces_matching_partition_only() {
        let db = setup_db();
        let repo = SyncUserStepRepository::new(db.pool.clone(), db.writer.clone());

        let ledgers = SyncPartition::for_user(Collection::Ledgers, 1);
        let sub_ledgers = SyncPartition::for_user(Collection::Ledgers, 1).with_sub_user(9);

        let mut step = SyncUserStep {
            base_start: Some(0),
            base_end: Some(500),
            ..SyncUserStep::default()
        };
        repo.upsert_step(ledgers.clone(), step.clone()).await.unwrap();
        repo.upsert_step(sub_ledgers.clone(), SyncUserStep::default())
            .await
            .unwrap();

        step.is_base_step_ready = true;
        repo.upsert_step(ledgers.clone(), step.clone()).await.unwrap();

        assert_eq!(repo.get_step(&ledgers).unwrap(), Some(step));
        assert_eq!(repo.get_step(&sub_ledgers).unwrap(), Some(SyncUserStep::default()));
        assert_eq!(repo.get_steps_for_user(1).unwrap().len(), 2);

        assert_eq!(repo.delete_for_user(1).await.unwrap(), 2);
        assert!(repo.get_step(&ledgers).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_observed_bounds_cover_main_and_staging() {
        let db = setup_db();
        let repo = SyncUserStepRepository::new(db.pool.clone(), db.writer.clone());
        let rows = CollectionRepository::new(db.pool.clone(), db.writer.clone());

        rows.insert_elems(
            "ledgers",
            Collection::Ledgers,
            vec![ledger(1, 1_000, 1), ledger(2, 3_000, 1), ledger(3, 9_000, 2)],
        )
        .await
        .unwrap();

        let staging = staging_table_name(4, Collection::Ledgers);
        {
            let mut conn = get_connection(&db.pool).unwrap();
            create_collection_table(&mut conn, Collection::Ledgers.schema(), &staging).unwrap();
        }
        rows.insert_elems(&staging, Collection::Ledgers, vec![ledger(4, 5_000, 1)])
            .await
            .unwrap();

        let partition = SyncPartition::for_user(Collection::Ledgers, 1);
        let bounds = repo.get_observed_bounds(&partition, Some(4)).unwrap();
        assert_eq!(
            bounds,
            ObservedBounds {
                first_main: Some(1_000),
                last_main: Some(3_000),
                first_staging: Some(5_000),
                last_staging: Some(5_000),
            }
        );

        // a run without a staging table only sees main
        let bounds = repo.get_observed_bounds(&partition, Some(99)).unwrap();
        assert!(bounds.is_staging_empty());
        assert!(!bounds.is_main_empty());
    }

    #[tokio::test]
    async fn test_bounds_without_sub_user_span_all_user_rows() {
        let db = setup_db();
        let repo = SyncUserStepRepository::new(db.pool.clone(), db.writer.clone());
        let rows = CollectionRepository::new(db.pool.clone(), db.writer.clone());

        let mut sub_row = ledger(2, 8_000, 1);
        sub_row["sub_user_id"] = json!(9);
        rows.insert_elems("ledgers", Collection::Ledgers, vec![ledger(1, 1_000, 1), sub_row])
            .await
            .unwrap();

        let whole_user = SyncPartition::for_user(Collection::Ledgers, 1);
        let bounds = repo.get_observed_bounds(&whole_user, None).unwrap();
        assert_eq!((bounds.first_main, bounds.last_main), (Some(1_000), Some(8_000)));

        let sub_user = SyncPartition::for_user(Collection::Ledgers, 1).with_sub_user(9);
        let bounds = repo.get_observed_bounds(&sub_user, None).unwrap();
        assert_eq!((bounds.first_main, bounds.last_main), (Some(8_000), Some(8_000)));
    }

    #[tokio::test]
    async fn test_last_synced_info_is_idempotent() {
        let db = setup_db();
        let repo = Arc::new(SyncUserStepRepository::new(db.pool.clone(), db.writer.clone()));
        let rows = CollectionRepository::new(db.pool.clone(), db.writer.clone());
        rows.insert_elems("ledgers", Collection::Ledgers, vec![ledger(1, 2_000, 1)])
            .await
            .unwrap();

        let tracker = SyncStepTracker::new(repo);
        let partition = SyncPartition::for_user(Collection::Ledgers, 1);
        let first = tracker.get_last_synced_info(&partition, None).unwrap();
        let second = tracker.get_last_synced_info(&partition, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.last_elem_mts, 2_000);
    }
}
