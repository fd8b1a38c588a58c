use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    conversion_schema, usd_price, BackfillSummary, CandlePriceSource, ConversionRow,
    ConversionSchema, ConversionTarget, ConvertedRow,
};
use crate::collections::Collection;
use crate::errors::Result;
use crate::settings::SyncSettings;
use crate::sync::staging_table_name;

/// Prices raw ledger and movement rows in USD, batch by batch.
pub struct CurrencyConversionBackfill {
    target: Arc<dyn ConversionTarget>,
    prices: Arc<dyn CandlePriceSource>,
    settings: SyncSettings,
}

impl CurrencyConversionBackfill {
    pub fn new(
        target: Arc<dyn ConversionTarget>,
        prices: Arc<dyn CandlePriceSource>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            target,
            prices,
            settings,
        }
    }

    /// Converts every eligible collection. Runs against the run's staging
    /// tables when `run_id` is set, against main tables otherwise.
    ///
    /// `synced` lists what the triggering sync touched; the pass is skipped
    /// when none of it can produce or price convertible rows.
    pub async fn execute(&self, run_id: Option<i64>, synced: &[Collection]) -> BackfillSummary {
        let mut summary = BackfillSummary::default();

        let relevant = synced.is_empty()
            || synced.iter().any(|c| {
                matches!(
                    c,
                    Collection::Ledgers | Collection::Movements | Collection::Candles
                )
            });
        if !relevant {
            debug!("Currency conversion skipped for {:?}", synced);
            return summary;
        }

        for collection in Collection::all() {
            let Some(schema) = conversion_schema(*collection) else {
                continue;
            };
            let table = match run_id {
                Some(id) => staging_table_name(id, *collection),
                None => collection.table_name().to_string(),
            };

            match self.convert_table(&table, schema, &mut summary).await {
                Ok(rows) => summary.converted.push((*collection, rows)),
                Err(e) => {
                    error!("Currency conversion of '{}' stopped: {}", table, e);
                    summary.failed.push((*collection, e.to_string()));
                }
            }
        }

        info!(
            "Currency conversion finished: {} rows converted, {} unresolved",
            summary.total_converted(),
            summary.unresolved
        );
        summary
    }

    async fn convert_table(
        &self,
        table: &str,
        schema: &'static ConversionSchema,
        summary: &mut BackfillSummary,
    ) -> Result<usize> {
        if !self.target.has_table(table)? {
            debug!("Table '{}' does not exist, nothing to convert", table);
            return Ok(0);
        }

        let batch_size = self.settings.conversion_batch_size;
        let mut after_id = 0;
        let mut converted = 0;

        for _ in 0..self.settings.max_batches_per_collection {
            tokio::task::yield_now().await;

            let rows = self
                .target
                .fetch_unconverted(table, schema, after_id, batch_size)?;
            let Some(last) = rows.last() else {
                break;
            };
            after_id = last.id;
            let fetched = rows.len();

            let (ready, unresolved) = self.convert_rows(schema, rows).await?;
            summary.unresolved += unresolved;
            if !ready.is_empty() {
                converted += self.target.write_converted(table, schema, ready).await?;
            }

            if (fetched as i64) < batch_size {
                break;
            }
        }

        Ok(converted)
    }

    /// Splits a batch into priced rows and the count of rows without a price.
    pub async fn convert_rows(
        &self,
        schema: &ConversionSchema,
        rows: Vec<ConversionRow>,
    ) -> Result<(Vec<ConvertedRow>, usize)> {
        let mut prices: HashMap<(String, i64), Option<rust_decimal::Decimal>> = HashMap::new();
        let mut ready = Vec::with_capacity(rows.len());
        let mut unresolved = 0;

        for row in rows {
            let (Some(currency), Some(mts)) = (row.currency.as_deref(), row.mts) else {
                unresolved += 1;
                continue;
            };

            let key = (currency.to_string(), mts);
            let price = match prices.get(&key) {
                Some(price) => *price,
                None => {
                    let price = usd_price(self.prices.as_ref(), currency, mts).await?;
                    prices.insert(key, price);
                    price
                }
            };
            let Some(price) = price else {
                unresolved += 1;
                continue;
            };

            let values: Vec<_> = schema
                .fields
                .iter()
                .zip(row.inputs.iter())
                .filter_map(|(field, input)| input.map(|v| (field, v * price)))
                .flat_map(|(field, value)| field.outputs.iter().map(move |out| (*out, value)))
                .collect();

            if values.is_empty() {
                continue;
            }
            ready.push(ConvertedRow { id: row.id, values });
        }

        Ok((ready, unresolved))
    }
}
