use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::collections::Collection;
use crate::errors::Result;

/// One input column priced into one or more output columns.
#[derive(Debug)]
pub struct ConversionField {
    pub input: &'static str,
    pub outputs: &'static [&'static str],
}

#[derive(Debug)]
pub struct ConversionSchema {
    pub collection: Collection,
    pub symbol_field: &'static str,
    pub date_field: &'static str,
    pub fields: &'static [ConversionField],
    /// Converted rows are queued for sub-account balance recalculation.
    pub resets_balance_recalc: bool,
}

impl ConversionSchema {
    pub fn output_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().flat_map(|f| f.outputs.iter().copied())
    }
}

static LEDGERS_CONVERSION: ConversionSchema = ConversionSchema {
    collection: Collection::Ledgers,
    symbol_field: "currency",
    date_field: "mts",
    fields: &[
        ConversionField {
            input: "amount",
            outputs: &["amount_usd"],
        },
        ConversionField {
            input: "_native_balance",
            outputs: &["balance_usd", "_native_balance_usd"],
        },
    ],
    resets_balance_recalc: true,
};

static MOVEMENTS_CONVERSION: ConversionSchema = ConversionSchema {
    collection: Collection::Movements,
    symbol_field: "currency",
    date_field: "mts_updated",
    fields: &[ConversionField {
        input: "amount",
        outputs: &["amount_usd"],
    }],
    resets_balance_recalc: false,
};

pub fn conversion_schema(collection: Collection) -> Option<&'static ConversionSchema> {
    match collection {
        Collection::Ledgers => Some(&LEDGERS_CONVERSION),
        Collection::Movements => Some(&MOVEMENTS_CONVERSION),
        Collection::Trades | Collection::Candles => None,
    }
}

/// A row awaiting conversion. `inputs` follows `ConversionSchema::fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRow {
    pub id: i64,
    pub currency: Option<String>,
    pub mts: Option<i64>,
    pub inputs: Vec<Option<Decimal>>,
}

/// Output values to write back, keyed by column.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRow {
    pub id: i64,
    pub values: Vec<(&'static str, Decimal)>,
}

/// Table access needed by the backfill.
#[async_trait]
pub trait ConversionTarget: Send + Sync {
    fn has_table(&self, table: &str) -> Result<bool>;

    /// Rows with `_id > after_id` and at least one NULL output, ascending.
    fn fetch_unconverted(
        &self,
        table: &str,
        schema: &'static ConversionSchema,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ConversionRow>>;

    async fn write_converted(
        &self,
        table: &str,
        schema: &'static ConversionSchema,
        rows: Vec<ConvertedRow>,
    ) -> Result<usize>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub converted: Vec<(Collection, usize)>,
    /// Rows left for a later pass because no price was known.
    pub unresolved: usize,
    pub failed: Vec<(Collection, String)>,
}

impl BackfillSummary {
    pub fn total_converted(&self) -> usize {
        self.converted.iter().map(|(_, n)| n).sum()
    }
}
