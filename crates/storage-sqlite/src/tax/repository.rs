use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use std::sync::Arc;

use crate::db::{get_connection, table_exists, DbPool};
use crate::errors::IntoCore;
use crate::utils::parse_decimal;
use ledgersync_core::collections::Collection;
use ledgersync_core::errors::{Result, ValidationError};
use ledgersync_core::tax::{MovementRecord, TaxEventSource, TradeRecord};

#[derive(QueryableByName, Debug)]
struct TradeRowDB {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    symbol: String,
    #[diesel(sql_type = BigInt)]
    mts_create: i64,
    #[diesel(sql_type = Text)]
    exec_amount: String,
    #[diesel(sql_type = Text)]
    exec_price: String,
    #[diesel(sql_type = Nullable<Text>)]
    order_type: Option<String>,
}

#[derive(QueryableByName, Debug)]
struct MovementRowDB {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    currency: String,
    #[diesel(sql_type = BigInt)]
    mts_updated: i64,
    #[diesel(sql_type = Text)]
    amount: String,
    #[diesel(sql_type = Nullable<Text>)]
    amount_usd: Option<String>,
}

fn required(column: &str, raw: &str) -> Result<rust_decimal::Decimal> {
    parse_decimal(column, Some(raw))?
        .ok_or_else(|| ValidationError::MissingField(column.to_string()).into())
}

impl TradeRowDB {
    fn into_domain(self) -> Result<TradeRecord> {
        Ok(TradeRecord {
            exec_amount: required("exec_amount", &self.exec_amount)?,
            exec_price: required("exec_price", &self.exec_price)?,
            id: self.id,
            symbol: self.symbol,
            mts_create: self.mts_create,
            order_type: self.order_type,
        })
    }
}

impl MovementRowDB {
    fn into_domain(self) -> Result<MovementRecord> {
        Ok(MovementRecord {
            amount: required("amount", &self.amount)?,
            amount_usd: parse_decimal("amount_usd", self.amount_usd.as_deref())?,
            id: self.id,
            currency: self.currency,
            mts_updated: self.mts_updated,
        })
    }
}

/// Reads the main trades and movements tables, oldest first.
pub struct TaxEventRepository {
    pool: Arc<DbPool>,
}

impl TaxEventRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

impl TaxEventSource for TaxEventRepository {
    fn get_trades_until(&self, user_id: i64, end: i64) -> Result<Vec<TradeRecord>> {
        let mut conn = get_connection(&self.pool)?;
        if !table_exists(&mut conn, Collection::Trades.table_name())? {
            return Ok(Vec::new());
        }

        let rows: Vec<TradeRowDB> = diesel::sql_query(
            "SELECT id, symbol, mts_create, exec_amount, exec_price, order_type \
             FROM trades WHERE user_id = ? AND mts_create <= ? \
             ORDER BY mts_create, id, _id",
        )
        .bind::<BigInt, _>(user_id)
        .bind::<BigInt, _>(end)
        .load(&mut conn)
        .into_core()?;

        rows.into_iter().map(TradeRowDB::into_domain).collect()
    }

    fn get_movements_until(&self, user_id: i64, end: i64) -> Result<Vec<MovementRecord>> {
        let mut conn = get_connection(&self.pool)?;
        if !table_exists(&mut conn, Collection::Movements.table_name())? {
            return Ok(Vec::new());
        }

        let rows: Vec<MovementRowDB> = diesel::sql_query(
            "SELECT id, currency, mts_updated, amount, amount_usd \
             FROM movements WHERE user_id = ? AND mts_updated <= ? \
             ORDER BY mts_updated, id, _id",
        )
        .bind::<BigInt, _>(user_id)
        .bind::<BigInt, _>(end)
        .load(&mut conn)
        .into_core()?;

        rows.into_iter().map(MovementRowDB::into_domain).collect()
    }
}
