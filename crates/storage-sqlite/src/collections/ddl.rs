use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use log::debug;

use crate::errors::IntoCore;
use crate::utils::quote_ident;
use ledgersync_core::collections::{Collection, CollectionSchema, ColumnDef, ColumnType};
use ledgersync_core::errors::Result;

fn column_type_sql(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::Id => "INTEGER PRIMARY KEY AUTOINCREMENT",
        ColumnType::BigInt => "BIGINT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Text | ColumnType::Decimal => "TEXT",
    }
}

fn column_sql(def: &ColumnDef) -> String {
    let mut sql = format!("{} {}", quote_ident(def.name), column_type_sql(def.kind));
    if !def.nullable && def.kind != ColumnType::Id {
        sql.push_str(" NOT NULL");
    }
    sql
}

/// Unique-key expression list. Nullable key columns are wrapped in `IFNULL`
/// so rows without a sub-user still collide.
pub fn unique_key_sql(schema: &CollectionSchema) -> String {
    schema
        .unique_key
        .iter()
        .map(|name| match schema.column(name) {
            Some(def) if def.nullable => {
                let fallback = match def.kind {
                    ColumnType::Text | ColumnType::Decimal => "''",
                    _ => "0",
                };
                format!("IFNULL({}, {})", quote_ident(name), fallback)
            }
            _ => quote_ident(name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// DDL for `table_name` shaped like `schema`: the table, its unique index and
/// lookup indexes on the date and user columns.
pub fn create_table_statements(schema: &CollectionSchema, table_name: &str) -> Vec<String> {
    let table = quote_ident(table_name);
    let columns = schema
        .columns
        .iter()
        .map(column_sql)
        .collect::<Vec<_>>()
        .join(", ");

    let mut statements = vec![
        format!("CREATE TABLE IF NOT EXISTS {} ({})", table, columns),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("{}_unique_key", table_name)),
            table,
            unique_key_sql(schema)
        ),
    ];

    if let Some(date_field) = schema.date_field {
        let mut indexed = Vec::new();
        if schema.has_user {
            indexed.push(quote_ident("user_id"));
        }
        if let Some(symbol_field) = schema.timeframe_field.and(schema.symbol_field) {
            indexed.push(quote_ident(symbol_field));
        }
        indexed.push(quote_ident(date_field));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("{}_{}", table_name, date_field)),
            table,
            indexed.join(", ")
        ));
    }

    statements
}

pub fn create_collection_table(
    conn: &mut SqliteConnection,
    schema: &CollectionSchema,
    table_name: &str,
) -> Result<()> {
    debug!("Creating collection table {}", table_name);
    conn.batch_execute(&create_table_statements(schema, table_name).join(";\n"))
        .into_core()
}

/// Creates the main table of every registered collection.
pub fn ensure_collection_tables(conn: &mut SqliteConnection) -> Result<()> {
    for collection in Collection::all() {
        let schema = collection.schema();
        create_collection_table(conn, schema, schema.table_name)?;
    }
    Ok(())
}
