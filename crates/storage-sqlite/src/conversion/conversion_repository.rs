use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::sqlite::Sqlite;
use std::sync::Arc;

use crate::db::{get_connection, table_exists, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::utils::{parse_decimal, quote_ident};
use ledgersync_core::collections::{ID_COLUMN, IS_BALANCE_RECALCED_COLUMN};
use ledgersync_core::conversion::{ConversionRow, ConversionSchema, ConversionTarget, ConvertedRow};
use ledgersync_core::errors::{Result, ValidationError};

#[derive(QueryableByName, Debug)]
struct UnconvertedRow {
    #[diesel(sql_type = BigInt)]
    row_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    currency: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    mts: Option<i64>,
    /// JSON array of the input columns, in schema order.
    #[diesel(sql_type = Text)]
    inputs: String,
}

fn select_unconverted_sql(table: &str, schema: &ConversionSchema) -> String {
    let inputs = schema
        .fields
        .iter()
        .map(|f| quote_ident(f.input))
        .collect::<Vec<_>>()
        .join(", ");
    // A NULL input never yields its outputs, so only rows with something
    // convertible left are pending.
    let missing = schema
        .fields
        .iter()
        .map(|f| {
            let outputs = f
                .outputs
                .iter()
                .map(|c| format!("{} IS NULL", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("({} IS NOT NULL AND ({}))", quote_ident(f.input), outputs)
        })
        .collect::<Vec<_>>()
        .join(" OR ");

    format!(
        "SELECT {id} AS row_id, {symbol} AS currency, {date} AS mts, \
         json_array({inputs}) AS inputs \
         FROM {table} WHERE {id} > ? AND {symbol} IS NOT NULL AND {date} IS NOT NULL \
         AND ({missing}) ORDER BY {id} LIMIT ?",
        id = quote_ident(ID_COLUMN),
        symbol = quote_ident(schema.symbol_field),
        date = quote_ident(schema.date_field),
        inputs = inputs,
        table = quote_ident(table),
        missing = missing,
    )
}

fn parse_inputs(schema: &ConversionSchema, raw: &str) -> Result<Vec<Option<rust_decimal::Decimal>>> {
    let values: Vec<Option<String>> = serde_json::from_str(raw)?;
    if values.len() != schema.fields.len() {
        return Err(ValidationError::InvalidInput(format!(
            "expected {} conversion inputs, got {}",
            schema.fields.len(),
            values.len()
        ))
        .into());
    }
    schema
        .fields
        .iter()
        .zip(values)
        .map(|(field, value)| parse_decimal(field.input, value.as_deref()))
        .collect()
}

/// Reads and writes the USD columns of ledger and movement tables.
pub struct ConversionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl ConversionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl ConversionTarget for ConversionRepository {
    fn has_table(&self, table: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        table_exists(&mut conn, table)
    }

    fn fetch_unconverted(
        &self,
        table: &str,
        schema: &'static ConversionSchema,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ConversionRow>> {
        let mut conn = get_connection(&self.pool)?;
        let rows: Vec<UnconvertedRow> = diesel::sql_query(select_unconverted_sql(table, schema))
            .bind::<BigInt, _>(after_id)
            .bind::<BigInt, _>(limit)
            .load(&mut conn)
            .into_core()?;

        rows.into_iter()
            .map(|row| {
                Ok(ConversionRow {
                    id: row.row_id,
                    currency: row.currency,
                    mts: row.mts,
                    inputs: parse_inputs(schema, &row.inputs)?,
                })
            })
            .collect()
    }

    async fn write_converted(
        &self,
        table: &str,
        schema: &'static ConversionSchema,
        rows: Vec<ConvertedRow>,
    ) -> Result<usize> {
        let table = quote_ident(table);
        let resets_balance_recalc = schema.resets_balance_recalc;

        self.writer
            .exec(move |conn| {
                let mut updated = 0;
                for row in rows {
                    if row.values.is_empty() {
                        continue;
                    }
                    let mut assignments: Vec<String> = row
                        .values
                        .iter()
                        .map(|(column, _)| format!("{} = ?", quote_ident(column)))
                        .collect();
                    if resets_balance_recalc {
                        assignments.push(format!("{} = NULL", quote_ident(IS_BALANCE_RECALCED_COLUMN)));
                    }

                    let sql = format!(
                        "UPDATE {} SET {} WHERE {} = ?",
                        table,
                        assignments.join(", "),
                        quote_ident(ID_COLUMN)
                    );
                    let mut query = diesel::sql_query(sql).into_boxed::<Sqlite>();
                    for (_, value) in &row.values {
                        query = query.bind::<Text, _>(value.normalize().to_string());
                    }
                    updated += query.bind::<BigInt, _>(row.id).execute(conn).into_core()?;
                }
                Ok(updated)
            })
            .await
    }
}
