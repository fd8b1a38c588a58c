use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::sqlite::{Sqlite, SqliteConnection};
use std::sync::Arc;

use crate::db::{get_connection, table_exists, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::utils::{parse_decimal, quote_ident};
use ledgersync_core::collections::Collection;
use ledgersync_core::errors::Result;
use ledgersync_core::ledgers::{
    BalanceKey, LedgerBalanceRow, RecalcedBalance, SubAccountLedgerSource,
};
use ledgersync_core::sync::staging_table_name;
use ledgersync_core::timeframe::{BalanceGroupRow, Timeframe, WalletBalance, WalletHistorySource};

const LEDGER_ROW_COLUMNS: &str = "_id AS row_id, id, mts, COALESCE(wallet, '') AS wallet, \
     currency, user_id, sub_user_id, \
     _native_balance AS native_balance, _native_balance_usd AS native_balance_usd";

#[derive(QueryableByName, Debug)]
struct LedgerRowDB {
    #[diesel(sql_type = BigInt)]
    row_id: i64,
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    mts: i64,
    #[diesel(sql_type = Text)]
    wallet: String,
    #[diesel(sql_type = Text)]
    currency: String,
    #[diesel(sql_type = BigInt)]
    user_id: i64,
    #[diesel(sql_type = BigInt)]
    sub_user_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    native_balance: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    native_balance_usd: Option<String>,
}

impl LedgerRowDB {
    fn into_domain(self) -> Result<LedgerBalanceRow> {
        Ok(LedgerBalanceRow {
            row_id: self.row_id,
            id: self.id,
            mts: self.mts,
            wallet: self.wallet,
            currency: self.currency,
            user_id: self.user_id,
            sub_user_id: self.sub_user_id,
            native_balance: parse_decimal("_native_balance", self.native_balance.as_deref())?,
            native_balance_usd: parse_decimal(
                "_native_balance_usd",
                self.native_balance_usd.as_deref(),
            )?,
        })
    }
}

#[derive(QueryableByName, Debug)]
struct WalletBalanceDB {
    #[diesel(sql_type = Text)]
    group_key: String,
    #[diesel(sql_type = BigInt)]
    mts: i64,
    #[diesel(sql_type = Text)]
    wallet: String,
    #[diesel(sql_type = Text)]
    currency: String,
    #[diesel(sql_type = Text)]
    balance: String,
}

/// Latest balance per group, wallet and currency. `group` is an SQL
/// expression over `mts`, `range` the filter on `mts`.
fn latest_balance_sql(group: &str, range: &str) -> String {
    format!(
        "SELECT group_key, mts, wallet, currency, balance FROM (\
            SELECT {group} AS group_key, mts, COALESCE(wallet, '') AS wallet, currency, \
                   COALESCE(balance, _native_balance) AS balance, \
                   ROW_NUMBER() OVER (\
                       PARTITION BY {group}, COALESCE(wallet, ''), currency \
                       ORDER BY mts DESC, _id DESC) AS rn \
            FROM ledgers WHERE user_id = ? AND {range}\
         ) WHERE rn = 1 AND balance IS NOT NULL \
         ORDER BY mts, wallet, currency",
        group = group,
        range = range,
    )
}

/// Ledger reads over the main table and, during a run, its staging table.
pub struct LedgerRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LedgerRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn table_for(run_id: Option<i64>) -> String {
        match run_id {
            Some(run_id) => staging_table_name(run_id, Collection::Ledgers),
            None => Collection::Ledgers.table_name().to_string(),
        }
    }

    fn load_balances(
        &self,
        sql: String,
        user_id: i64,
        bounds: &[i64],
    ) -> Result<Vec<WalletBalanceDB>> {
        let mut conn = get_connection(&self.pool)?;
        if !table_exists(&mut conn, Collection::Ledgers.table_name())? {
            return Ok(Vec::new());
        }
        let mut query = diesel::sql_query(sql)
            .into_boxed::<Sqlite>()
            .bind::<BigInt, _>(user_id);
        for bound in bounds {
            query = query.bind::<BigInt, _>(*bound);
        }
        query.load(&mut conn).into_core()
    }
}

fn load_ledger_rows(
    conn: &mut SqliteConnection,
    sql: String,
    binds: Vec<i64>,
) -> Result<Vec<LedgerBalanceRow>> {
    let mut query = diesel::sql_query(sql).into_boxed::<Sqlite>();
    for value in binds {
        query = query.bind::<BigInt, _>(value);
    }
    let rows: Vec<LedgerRowDB> = query.load(conn).into_core()?;
    rows.into_iter().map(LedgerRowDB::into_domain).collect()
}

impl WalletHistorySource for LedgerRepository {
    fn get_wallets_at(&self, user_id: i64, mts: i64) -> Result<Vec<WalletBalance>> {
        let rows = self.load_balances(latest_balance_sql("''", "mts <= ?"), user_id, &[mts])?;

        let mut balances = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(balance) = parse_decimal("balance", Some(&row.balance))? {
                balances.push(WalletBalance {
                    wallet: row.wallet,
                    currency: row.currency,
                    balance,
                });
            }
        }
        Ok(balances)
    }

    fn get_grouped_balances(
        &self,
        user_id: i64,
        timeframe: Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<BalanceGroupRow>> {
        let group = format!(
            "strftime('{}', mts / 1000, 'unixepoch')",
            timeframe.strftime_format()
        );
        let rows = self.load_balances(
            latest_balance_sql(&group, "mts > ? AND mts <= ?"),
            user_id,
            &[start, end],
        )?;

        let mut balances = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(balance) = parse_decimal("balance", Some(&row.balance))? {
                balances.push(BalanceGroupRow {
                    group_key: row.group_key,
                    mts: row.mts,
                    wallet: row.wallet,
                    currency: row.currency,
                    balance,
                });
            }
        }
        Ok(balances)
    }
}

#[async_trait]
impl SubAccountLedgerSource for LedgerRepository {
    fn get_first_unrecalced(&self, run_id: Option<i64>) -> Result<Option<LedgerBalanceRow>> {
        let table = Self::table_for(run_id);
        let mut conn = get_connection(&self.pool)?;
        if !table_exists(&mut conn, &table)? {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM {} \
             WHERE sub_user_id IS NOT NULL AND _is_balance_recalced IS NULL \
             ORDER BY mts, id, _id LIMIT 1",
            LEDGER_ROW_COLUMNS,
            quote_ident(&table)
        );
        Ok(load_ledger_rows(&mut conn, sql, Vec::new())?
            .into_iter()
            .next())
    }

    fn get_rows_from(
        &self,
        run_id: Option<i64>,
        from_mts: i64,
        skip_row_ids: &[i64],
        limit: i64,
    ) -> Result<Vec<LedgerBalanceRow>> {
        let table = Self::table_for(run_id);
        let mut conn = get_connection(&self.pool)?;
        if !table_exists(&mut conn, &table)? {
            return Ok(Vec::new());
        }

        let skip = if skip_row_ids.is_empty() {
            String::new()
        } else {
            format!(
                " AND _id NOT IN ({})",
                vec!["?"; skip_row_ids.len()].join(", ")
            )
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE sub_user_id IS NOT NULL AND mts >= ?{} \
             ORDER BY mts, id, _id LIMIT ?",
            LEDGER_ROW_COLUMNS,
            quote_ident(&table),
            skip
        );

        let mut binds = Vec::with_capacity(skip_row_ids.len() + 2);
        binds.push(from_mts);
        binds.extend_from_slice(skip_row_ids);
        binds.push(limit);
        load_ledger_rows(&mut conn, sql, binds)
    }

    fn get_latest_before(
        &self,
        run_id: Option<i64>,
        key: &BalanceKey,
        sub_user_id: i64,
        mts: i64,
    ) -> Result<Option<LedgerBalanceRow>> {
        let mut conn = get_connection(&self.pool)?;

        let mut tables = vec![Collection::Ledgers.table_name().to_string()];
        if let Some(run_id) = run_id {
            tables.push(staging_table_name(run_id, Collection::Ledgers));
        }
        let mut selects = Vec::new();
        for table in tables {
            if table_exists(&mut conn, &table)? {
                selects.push(format!(
                    "SELECT {} FROM {} WHERE user_id = ? AND sub_user_id = ? AND mts < ? \
                     AND COALESCE(wallet, '') = ? AND currency = ?",
                    LEDGER_ROW_COLUMNS,
                    quote_ident(&table)
                ));
            }
        }
        if selects.is_empty() {
            return Ok(None);
        }

        let parts = selects.len();
        let sql = format!(
            "SELECT * FROM ({}) ORDER BY mts DESC, row_id DESC LIMIT 1",
            selects.join(" UNION ALL ")
        );

        // Bind order follows the placeholders of each UNION part.
        let mut query = diesel::sql_query(sql).into_boxed::<Sqlite>();
        for _ in 0..parts {
            query = query
                .bind::<BigInt, _>(key.user_id)
                .bind::<BigInt, _>(sub_user_id)
                .bind::<BigInt, _>(mts)
                .bind::<Text, _>(key.wallet.clone())
                .bind::<Text, _>(key.currency.clone());
        }
        let rows: Vec<LedgerRowDB> = query.load(&mut conn).into_core()?;
        rows.into_iter().next().map(LedgerRowDB::into_domain).transpose()
    }

    async fn write_recalced(&self, run_id: Option<i64>, rows: Vec<RecalcedBalance>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = quote_ident(&Self::table_for(run_id));

        self.writer
            .exec(move |conn| {
                let sql = format!(
                    "UPDATE {} SET balance = ?, balance_usd = ?, _is_balance_recalced = 1 \
                     WHERE _id = ?",
                    table
                );
                let mut updated = 0;
                for row in rows {
                    updated += diesel::sql_query(&sql)
                        .bind::<Nullable<Text>, _>(row.balance.map(|d| d.normalize().to_string()))
                        .bind::<Nullable<Text>, _>(
                            row.balance_usd.map(|d| d.normalize().to_string()),
                        )
                        .bind::<BigInt, _>(row.row_id)
                        .execute(conn)
                        .into_core()?;
                }
                Ok(updated)
            })
            .await
    }
}
