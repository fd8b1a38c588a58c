use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::sqlite::Sqlite;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::utils::{chunk_for_sqlite, parse_decimal, quote_ident};
use ledgersync_core::collections::{Collection, ColumnDef, ColumnType};
use ledgersync_core::errors::{Result, ValidationError};

/// A JSON field coerced to the storage class of its column.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Int(Option<i64>),
    Text(Option<String>),
}

fn invalid(def: &ColumnDef, value: &Value) -> ledgersync_core::Error {
    ValidationError::InvalidInput(format!("column {}: unexpected value {}", def.name, value)).into()
}

fn to_sql_value(def: &ColumnDef, value: Option<&Value>) -> Result<SqlValue> {
    let value = match value {
        None | Some(Value::Null) => {
            if !def.nullable {
                return Err(ValidationError::MissingField(def.name.to_string()).into());
            }
            return Ok(match def.kind {
                ColumnType::BigInt | ColumnType::Integer | ColumnType::Id => SqlValue::Int(None),
                ColumnType::Text | ColumnType::Decimal => SqlValue::Text(None),
            });
        }
        Some(v) => v,
    };

    match def.kind {
        ColumnType::BigInt | ColumnType::Integer | ColumnType::Id => {
            let int = match value {
                Value::Number(n) => n.as_i64(),
                Value::Bool(b) => Some(i64::from(*b)),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            int.map(|v| SqlValue::Int(Some(v)))
                .ok_or_else(|| invalid(def, value))
        }
        ColumnType::Text => match value {
            Value::String(s) => Ok(SqlValue::Text(Some(s.clone()))),
            Value::Number(n) => Ok(SqlValue::Text(Some(n.to_string()))),
            Value::Bool(b) => Ok(SqlValue::Text(Some(b.to_string()))),
            _ => Err(invalid(def, value)),
        },
        ColumnType::Decimal => {
            let raw = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err(invalid(def, value)),
            };
            let decimal: Option<Decimal> = parse_decimal(def.name, Some(&raw))?;
            Ok(SqlValue::Text(decimal.map(|d| d.normalize().to_string())))
        }
    }
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Raw row access to collection tables, main or staging.
pub struct CollectionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl CollectionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        CollectionRepository { pool, writer }
    }

    /// Inserts API rows into `table`, which has the shape of `collection`.
    /// Rows that collide on the unique key replace the stored row.
    pub async fn insert_elems(
        &self,
        table: &str,
        collection: Collection,
        rows: Vec<Value>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let schema = collection.schema();
        let columns: Vec<&'static ColumnDef> = schema.data_columns().collect();

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let object = row.as_object().ok_or_else(|| {
                ValidationError::InvalidInput(format!("{} row is not an object", table))
            })?;
            values.push(
                columns
                    .iter()
                    .map(|def| to_sql_value(def, object.get(def.name)))
                    .collect::<Result<Vec<_>>>()?,
            );
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let table = quote_ident(table);

        self.writer
            .exec(move |conn| {
                let mut inserted = 0;
                for chunk in chunk_for_sqlite(&values, columns.len()) {
                    let sql = format!(
                        "INSERT OR REPLACE INTO {} ({}) VALUES {}",
                        table,
                        column_list,
                        vec![placeholders.as_str(); chunk.len()].join(", ")
                    );
                    let mut query = diesel::sql_query(sql).into_boxed::<Sqlite>();
                    for value in chunk.iter().flatten() {
                        query = match value {
                            SqlValue::Int(v) => query.bind::<Nullable<BigInt>, _>(*v),
                            SqlValue::Text(v) => query.bind::<Nullable<Text>, _>(v.clone()),
                        };
                    }
                    inserted += query.execute(conn).into_core()?;
                }
                Ok(inserted)
            })
            .await
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let row: CountRow =
            diesel::sql_query(format!("SELECT COUNT(*) AS count FROM {}", quote_ident(table)))
                .get_result(&mut conn)
                .into_core()?;
        Ok(row.count)
    }
}
