use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::db::{get_connection, table_exists, DbPool};
use crate::errors::IntoCore;
use crate::utils::parse_decimal;
use ledgersync_core::collections::Collection;
use ledgersync_core::constants::PRICE_CANDLE_TIMEFRAME;
use ledgersync_core::conversion::{CandlePriceCache, CandlePriceSource};
use ledgersync_core::errors::Result;

#[derive(QueryableByName, Debug)]
struct CandleCloseRow {
    #[diesel(sql_type = BigInt)]
    mts: i64,
    #[diesel(sql_type = Text)]
    close: String,
}

const NEAREST_BEFORE: &str = "SELECT mts, close FROM candles \
     WHERE _symbol = ? AND _timeframe = ? AND mts <= ? \
     ORDER BY mts DESC LIMIT 1";

const NEAREST_AFTER: &str = "SELECT mts, close FROM candles \
     WHERE _symbol = ? AND _timeframe = ? AND mts >= ? \
     ORDER BY mts ASC LIMIT 1";

/// Daily candle closes stored in the `candles` collection.
pub struct CandleRepository {
    pool: Arc<DbPool>,
    timeframe: String,
}

impl CandleRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self {
            pool,
            timeframe: PRICE_CANDLE_TIMEFRAME.to_string(),
        }
    }

    fn nearest(
        &self,
        conn: &mut SqliteConnection,
        sql: &'static str,
        symbol_pair: &str,
        mts: i64,
    ) -> Result<Option<(i64, Decimal)>> {
        let row: Option<CandleCloseRow> = diesel::sql_query(sql)
            .bind::<Text, _>(symbol_pair)
            .bind::<Text, _>(&self.timeframe)
            .bind::<BigInt, _>(mts)
            .get_result(conn)
            .optional()
            .into_core()?;

        match row {
            Some(row) => Ok(parse_decimal("close", Some(&row.close))?.map(|close| (row.mts, close))),
            None => Ok(None),
        }
    }

    /// Every close of `symbol_pairs` within `[start, end]`, for report
    /// computations that price many points.
    pub fn load_cache(&self, symbol_pairs: &[String], start: i64, end: i64) -> Result<CandlePriceCache> {
        let mut cache = CandlePriceCache::new();
        let mut conn = get_connection(&self.pool)?;
        if !table_exists(&mut conn, Collection::Candles.table_name())? {
            return Ok(cache);
        }

        for symbol_pair in symbol_pairs {
            let rows: Vec<CandleCloseRow> = diesel::sql_query(
                "SELECT mts, close FROM candles \
                 WHERE _symbol = ? AND _timeframe = ? AND mts BETWEEN ? AND ? \
                 ORDER BY mts",
            )
            .bind::<Text, _>(symbol_pair)
            .bind::<Text, _>(&self.timeframe)
            .bind::<BigInt, _>(start)
            .bind::<BigInt, _>(end)
            .load(&mut conn)
            .into_core()?;

            for row in rows {
                if let Some(close) = parse_decimal("close", Some(&row.close))? {
                    cache.insert(symbol_pair, row.mts, close);
                }
            }
        }
        Ok(cache)
    }
}

#[async_trait]
impl CandlePriceSource for CandleRepository {
    /// The close nearest to `mts`; on a tie the earlier candle wins.
    async fn price_at(&self, symbol_pair: &str, mts: i64) -> Result<Option<Decimal>> {
        let mut conn = get_connection(&self.pool)?;
        if !table_exists(&mut conn, Collection::Candles.table_name())? {
            return Ok(None);
        }

        let before = self.nearest(&mut conn, NEAREST_BEFORE, symbol_pair, mts)?;
        let after = self.nearest(&mut conn, NEAREST_AFTER, symbol_pair, mts)?;

        Ok(match (before, after) {
            (Some((b_mts, b)), Some((a_mts, a))) => {
                if mts - b_mts <= a_mts - mts {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some((_, b)), None) => Some(b),
            (None, Some((_, a))) => Some(a),
            (None, None) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CollectionRepository;
    use crate::test_support::setup_db;
    use ledgersync_core::conversion::usd_price;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const DAY: i64 = 86_400_000;

    async fn seed(repo: &CollectionRepository) {
        let candles = vec![
            json!({ "mts": DAY, "close": "100", "_symbol": "tBTCUSD", "_timeframe": "1D" }),
            json!({ "mts": 3 * DAY, "close": "300", "_symbol": "tBTCUSD", "_timeframe": "1D" }),
            json!({ "mts": 2 * DAY, "close": "999", "_symbol": "tBTCUSD", "_timeframe": "1h" }),
            json!({ "mts": 2 * DAY, "close": "1.1", "_symbol": "tEURUSD", "_timeframe": "1D" }),
        ];
        repo.insert_elems("candles", Collection::Candles, candles).await.unwrap();
    }

    #[tokio::test]
    async fn test_price_at_picks_nearest_daily_close() {
        let db = setup_db();
        seed(&CollectionRepository::new(db.pool.clone(), db.writer.clone())).await;
        let candles = CandleRepository::new(db.pool.clone());

        assert_eq!(candles.price_at("tBTCUSD", DAY + 1).await.unwrap(), Some(dec!(100)));
        assert_eq!(candles.price_at("tBTCUSD", 3 * DAY - 1).await.unwrap(), Some(dec!(300)));
        // equidistant
        assert_eq!(candles.price_at("tBTCUSD", 2 * DAY).await.unwrap(), Some(dec!(100)));
        assert_eq!(candles.price_at("tBTCUSD", 10 * DAY).await.unwrap(), Some(dec!(300)));
        assert_eq!(candles.price_at("tETHUSD", DAY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_usd_price_goes_through_pair_symbol() {
        let db = setup_db();
        seed(&CollectionRepository::new(db.pool.clone(), db.writer.clone())).await;
        let candles = CandleRepository::new(db.pool.clone());

        assert_eq!(usd_price(&candles, "EUR", DAY).await.unwrap(), Some(dec!(1.1)));
        assert_eq!(usd_price(&candles, "USD", DAY).await.unwrap(), Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn test_load_cache_limits_to_range() {
        let db = setup_db();
        seed(&CollectionRepository::new(db.pool.clone(), db.writer.clone())).await;
        let candles = CandleRepository::new(db.pool.clone());

        let cache = candles
            .load_cache(&["tBTCUSD".to_string()], 0, 2 * DAY)
            .unwrap();
        assert_eq!(cache.lookup("tBTCUSD", 5 * DAY), Some(dec!(100)));
        assert_eq!(cache.lookup("tEURUSD", DAY), None);
    }
}
