use async_trait::async_trait;
use diesel::connection::{AnsiTransactionManager, SimpleConnection, TransactionManager};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, info};
use std::sync::Arc;

use crate::collections::create_collection_table;
use crate::db::{
    drop_tables_without_fk, get_connection, list_tables, table_exists, DbPool, WriteHandle,
};
use crate::errors::{IntoCore, StorageError};
use crate::schema::sync_queue;
use crate::utils::quote_ident;
use ledgersync_core::collections::{Collection, ID_COLUMN};
use ledgersync_core::errors::{Result, SyncError};
use ledgersync_core::sync::{
    orphaned_staging_tables, parse_staging_table, staging_prefix, staging_table_name,
    MergeOptions, MergeSummary, MergedCollection, StagingRepositoryTrait, SyncQueueState,
    TableMatch,
};

fn validate_run_id(run_id: i64) -> Result<()> {
    if run_id <= 0 {
        return Err(SyncError::InvalidRunId(run_id).into());
    }
    Ok(())
}

fn run_tables(conn: &mut SqliteConnection, run_id: i64) -> Result<Vec<String>> {
    let prefix = staging_prefix(run_id);
    Ok(list_tables(conn)?
        .into_iter()
        .filter(|name| name.starts_with(&prefix))
        .collect())
}

/// Staging tables of `run_id` to merge, paired with their collection.
fn tables_to_merge(
    conn: &mut SqliteConnection,
    run_id: i64,
    table_match: TableMatch,
) -> Result<Vec<(String, Collection)>> {
    match table_match {
        TableMatch::Exact => {
            let mut tables = Vec::new();
            for collection in Collection::all() {
                let name = staging_table_name(run_id, *collection);
                if table_exists(conn, &name)? {
                    tables.push((name, *collection));
                }
            }
            Ok(tables)
        }
        TableMatch::Prefix => run_tables(conn, run_id)?
            .into_iter()
            .map(|name| -> Result<(String, Collection)> {
                let collection = parse_staging_table(&name)
                    .and_then(|(_, suffix)| Collection::from_table_name(suffix))
                    .ok_or_else(|| SyncError::UnmatchedStagingTable {
                        table: name.clone(),
                    })?;
                Ok((name, collection))
            })
            .collect(),
    }
}

fn in_transaction(conn: &mut SqliteConnection) -> Result<bool> {
    let depth = AnsiTransactionManager::transaction_manager_status_mut(conn)
        .transaction_depth()
        .map_err(StorageError::from)?;
    Ok(depth.is_some())
}

/// Upserts every staging row of `run_id` into its main table and drops the
/// run's staging tables.
///
/// With `commits_own_transaction` the merge opens an immediate transaction
/// of its own on `conn`. Otherwise `conn` must already be inside the caller's
/// transaction, which then decides whether the merge commits.
pub fn merge_run_tables(
    conn: &mut SqliteConnection,
    run_id: i64,
    opts: MergeOptions,
) -> Result<MergeSummary> {
    validate_run_id(run_id)?;

    if opts.commits_own_transaction {
        return conn
            .immediate_transaction::<_, StorageError, _>(|c| {
                merge_tables(c, run_id, opts.table_match).map_err(StorageError::from)
            })
            .map_err(Into::into);
    }
    if !in_transaction(conn)? {
        return Err(SyncError::MergeOutsideTransaction(run_id).into());
    }
    merge_tables(conn, run_id, opts.table_match)
}

fn merge_tables(
    conn: &mut SqliteConnection,
    run_id: i64,
    table_match: TableMatch,
) -> Result<MergeSummary> {
    let mut summary = MergeSummary {
        run_id,
        merged: Vec::new(),
    };

    for (staging, collection) in tables_to_merge(conn, run_id, table_match)? {
        let schema = collection.schema();
        create_collection_table(conn, schema, schema.table_name)?;

        let columns = schema
            .columns
            .iter()
            .filter(|c| c.name != ID_COLUMN)
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = diesel::sql_query(format!(
            "INSERT OR REPLACE INTO {main} ({cols}) SELECT {cols} FROM {staging} ORDER BY {id}",
            main = quote_ident(schema.table_name),
            cols = columns,
            staging = quote_ident(&staging),
            id = quote_ident(ID_COLUMN),
        ))
        .execute(conn)
        .into_core()?;

        conn.batch_execute(&format!("DROP TABLE {}", quote_ident(&staging)))
            .into_core()?;

        debug!("Merged {} rows from {} into {}", rows, staging, schema.table_name);
        summary.merged.push(MergedCollection { collection, rows });
    }

    // Run tables outside the registry are not merged but never outlive the run.
    for leftover in run_tables(conn, run_id)? {
        conn.batch_execute(&format!("DROP TABLE {}", quote_ident(&leftover)))
            .into_core()?;
        debug!("Dropped unmerged staging table {}", leftover);
    }

    Ok(summary)
}

pub struct StagingRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl StagingRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl StagingRepositoryTrait for StagingRepository {
    async fn begin(&self, run_id: i64, collections: &[Collection]) -> Result<()> {
        validate_run_id(run_id)?;
        let collections = collections.to_vec();

        self.writer
            .exec(move |conn| {
                for collection in collections {
                    let name = staging_table_name(run_id, collection);
                    conn.batch_execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&name)))
                        .into_core()?;
                    create_collection_table(conn, collection.schema(), &name)?;
                }
                Ok(())
            })
            .await?;

        info!("Staging tables created for run {}", run_id);
        Ok(())
    }

    /// Merges in a writer job of its own. A caller that holds a transaction
    /// runs [`merge_run_tables`] on its connection instead.
    async fn merge_to_main(&self, run_id: i64, opts: MergeOptions) -> Result<MergeSummary> {
        validate_run_id(run_id)?;
        if !opts.commits_own_transaction {
            return Err(SyncError::MergeOutsideTransaction(run_id).into());
        }

        // The writer job is the merge's own transaction.
        let joined = MergeOptions {
            commits_own_transaction: false,
            ..opts
        };
        let summary = self
            .writer
            .exec(move |conn| merge_run_tables(conn, run_id, joined))
            .await?;

        info!(
            "Run {} merged {} rows across {} collections",
            run_id,
            summary.total_rows(),
            summary.merged.len()
        );
        Ok(summary)
    }

    fn abort(&self, run_id: i64) -> Result<usize> {
        validate_run_id(run_id)?;
        let mut conn = get_connection(&self.pool)?;
        let tables = run_tables(&mut conn, run_id)?;
        let dropped = drop_tables_without_fk(&mut conn, &tables)?;
        if dropped > 0 {
            info!("Dropped {} staging tables of run {}", dropped, run_id);
        }
        Ok(dropped)
    }

    fn sweep_orphans(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let active_states = [
            SyncQueueState::New,
            SyncQueueState::Locked,
            SyncQueueState::Error,
        ]
        .map(|state| state.as_str());

        let active_run_ids = sync_queue::table
            .filter(sync_queue::state.eq_any(active_states))
            .select(sync_queue::id)
            .load::<i64>(&mut conn)
            .map_err(StorageError::from)?;

        let orphans = orphaned_staging_tables(&list_tables(&mut conn)?, &active_run_ids);
        drop_tables_without_fk(&mut conn, &orphans)?;

        if !orphans.is_empty() {
            info!("Swept {} orphaned staging tables", orphans.len());
        }
        Ok(orphans)
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        table_exists(&mut conn, name)
    }

    fn list_staging_tables(&self, run_id: i64) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        run_tables(&mut conn, run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CollectionRepository;
    use crate::sync::SyncQueueRepository;
    use crate::test_support::{setup_db, TestDb};
    use ledgersync_core::sync::SyncQueueRepositoryTrait;
    use serde_json::{json, Value};

    fn ledger(id: i64, amount: &str) -> Value {
        json!({ "id": id, "currency": "BTC", "mts": 1_000 + id, "amount": amount, "user_id": 1 })
    }

    fn trade(id: i64) -> Value {
        json!({
            "id": id, "symbol": "tBTCUSD", "mts_create": 2_000 + id,
            "exec_amount": "0.5", "exec_price": "20000", "user_id": 1
        })
    }

    fn amounts(db: &TestDb, table: &str) -> Vec<String> {
        #[derive(QueryableByName)]
        struct AmountRow {
            #[diesel(sql_type = diesel::sql_types::Text)]
            amount: String,
        }
        let mut conn = get_connection(&db.pool).unwrap();
        diesel::sql_query(format!("SELECT amount FROM {} ORDER BY id", quote_ident(table)))
            .load::<AmountRow>(&mut conn)
            .unwrap()
            .into_iter()
            .map(|r| r.amount)
            .collect()
    }

    #[tokio::test]
    async fn test_merge_upserts_and_drops_staging() {
        let db = setup_db();
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        let rows = CollectionRepository::new(db.pool.clone(), db.writer.clone());

        rows.insert_elems("ledgers", Collection::Ledgers, vec![ledger(1, "1")])
            .await
            .unwrap();

        staging
            .begin(3, &[Collection::Ledgers, Collection::Trades])
            .await
            .unwrap();
        let staged_ledgers = staging_table_name(3, Collection::Ledgers);
        rows.insert_elems(&staged_ledgers, Collection::Ledgers, vec![ledger(1, "7"), ledger(2, "2")])
            .await
            .unwrap();
        rows.insert_elems(
            &staging_table_name(3, Collection::Trades),
            Collection::Trades,
            vec![trade(1)],
        )
        .await
        .unwrap();

        let summary = staging.merge_to_main(3, MergeOptions::default()).await.unwrap();
        assert_eq!(summary.total_rows(), 3);
        assert_eq!(amounts(&db, "ledgers"), vec!["7", "2"]);
        assert_eq!(rows.count_rows("trades").unwrap(), 1);
        assert!(staging.list_staging_tables(3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_main_untouched() {
        let db = setup_db();
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        let rows = CollectionRepository::new(db.pool.clone(), db.writer.clone());

        staging
            .begin(5, &[Collection::Ledgers, Collection::Trades])
            .await
            .unwrap();
        rows.insert_elems(
            &staging_table_name(5, Collection::Ledgers),
            Collection::Ledgers,
            vec![ledger(1, "1")],
        )
        .await
        .unwrap();
        rows.insert_elems(
            &staging_table_name(5, Collection::Trades),
            Collection::Trades,
            vec![trade(1)],
        )
        .await
        .unwrap();

        {
            // ledgers merge first, then trades fail
            let mut conn = get_connection(&db.pool).unwrap();
            conn.batch_execute(
                "CREATE TRIGGER reject_trades BEFORE INSERT ON trades \
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }

        assert!(staging.merge_to_main(5, MergeOptions::default()).await.is_err());
        assert_eq!(rows.count_rows("ledgers").unwrap(), 0);
        assert_eq!(staging.list_staging_tables(5).unwrap().len(), 2);
        assert_eq!(rows.count_rows(&staging_table_name(5, Collection::Ledgers)).unwrap(), 1);
    }

    fn create_positions_table(db: &TestDb, run_id: i64) {
        let mut conn = get_connection(&db.pool).unwrap();
        conn.batch_execute(&format!("CREATE TABLE temp_s{}_positions (x INTEGER)", run_id))
            .unwrap();
    }

    #[tokio::test]
    async fn test_exact_merge_drops_unregistered_run_tables() {
        let db = setup_db();
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        staging.begin(6, &[Collection::Ledgers]).await.unwrap();
        create_positions_table(&db, 6);
        staging.begin(16, &[Collection::Ledgers]).await.unwrap();

        let exact = staging.merge_to_main(6, MergeOptions::default()).await.unwrap();
        assert_eq!(exact.merged.len(), 1);
        assert!(staging.list_staging_tables(6).unwrap().is_empty());
        assert!(!staging.has_table("temp_s6_positions").unwrap());

        // other runs keep their tables
        assert_eq!(staging.list_staging_tables(16).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_match_rejects_unknown_suffix() {
        let db = setup_db();
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        staging.begin(6, &[Collection::Ledgers]).await.unwrap();
        create_positions_table(&db, 6);

        let err = staging
            .merge_to_main(
                6,
                MergeOptions {
                    commits_own_transaction: true,
                    table_match: TableMatch::Prefix,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ledgersync_core::Error::Sync(SyncError::UnmatchedStagingTable { .. })
        ));
        assert_eq!(staging.list_staging_tables(6).unwrap().len(), 2);
    }

    async fn stage_one_ledger(db: &TestDb, run_id: i64) {
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        let rows = CollectionRepository::new(db.pool.clone(), db.writer.clone());
        staging.begin(run_id, &[Collection::Ledgers]).await.unwrap();
        rows.insert_elems(
            &staging_table_name(run_id, Collection::Ledgers),
            Collection::Ledgers,
            vec![ledger(1, "4")],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_merge_commits_its_own_transaction() {
        let db = setup_db();
        stage_one_ledger(&db, 9).await;

        let mut conn = get_connection(&db.pool).unwrap();
        let summary = merge_run_tables(&mut conn, 9, MergeOptions::default()).unwrap();
        drop(conn);

        assert_eq!(summary.total_rows(), 1);
        assert_eq!(amounts(&db, "ledgers"), vec!["4"]);
        assert!(StagingRepository::new(db.pool.clone(), db.writer.clone())
            .list_staging_tables(9)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_merge_joining_caller_transaction_rolls_back_with_it() {
        let db = setup_db();
        stage_one_ledger(&db, 10).await;
        let joined = MergeOptions {
            commits_own_transaction: false,
            table_match: TableMatch::Exact,
        };

        let mut conn = get_connection(&db.pool).unwrap();
        // without an open transaction there is nothing to join
        let err = merge_run_tables(&mut conn, 10, joined).unwrap_err();
        assert!(matches!(
            err,
            ledgersync_core::Error::Sync(SyncError::MergeOutsideTransaction(10))
        ));

        let result = conn.immediate_transaction::<(), StorageError, _>(|c| {
            let summary = merge_run_tables(c, 10, joined)?;
            assert_eq!(summary.total_rows(), 1);
            Err(StorageError::from(ledgersync_core::Error::Unexpected(
                "caller gave up".to_string(),
            )))
        });
        assert!(result.is_err());
        drop(conn);

        // the caller's rollback undid the merge
        assert!(amounts(&db, "ledgers").is_empty());
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        assert_eq!(staging.list_staging_tables(10).unwrap().len(), 1);

        // the async entry point always owns its transaction
        assert!(staging.merge_to_main(10, joined).await.is_err());
        assert_eq!(staging.merge_to_main(10, MergeOptions::default()).await.unwrap().total_rows(), 1);
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let db = setup_db();
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        staging
            .begin(8, &[Collection::Ledgers, Collection::Movements])
            .await
            .unwrap();

        assert_eq!(staging.abort(8).unwrap(), 2);
        assert_eq!(staging.abort(8).unwrap(), 0);
        assert!(!staging.has_table(&staging_table_name(8, Collection::Ledgers)).unwrap());
        assert!(staging.has_table("ledgers").unwrap());
        assert!(staging.abort(0).is_err());
    }

    #[tokio::test]
    async fn test_sweep_keeps_tables_of_active_jobs() {
        let db = setup_db();
        let staging = StagingRepository::new(db.pool.clone(), db.writer.clone());
        let queue = SyncQueueRepository::new(db.pool.clone(), db.writer.clone());

        let new_job = queue.create(Some(1), vec![Collection::Ledgers]).await.unwrap();
        let locked_job = queue.create(Some(2), vec![Collection::Ledgers]).await.unwrap();
        queue.try_lock(locked_job.id).await.unwrap();
        let done_job = queue.create(Some(3), vec![Collection::Ledgers]).await.unwrap();
        queue.update_state(done_job.id, SyncQueueState::Done).await.unwrap();

        for id in [new_job.id, locked_job.id, done_job.id, 77] {
            staging.begin(id, &[Collection::Ledgers]).await.unwrap();
        }

        let mut swept = staging.sweep_orphans().unwrap();
        swept.sort();
        let mut expected = vec![
            staging_table_name(done_job.id, Collection::Ledgers),
            staging_table_name(77, Collection::Ledgers),
        ];
        expected.sort();
        assert_eq!(swept, expected);

        assert_eq!(staging.list_staging_tables(new_job.id).unwrap().len(), 1);
        assert_eq!(staging.list_staging_tables(locked_job.id).unwrap().len(), 1);
    }
}
