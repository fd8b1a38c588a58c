//! Helpers for dynamic SQL over the collection tables.

use rust_decimal::Decimal;
use std::str::FromStr;

use ledgersync_core::errors::{Result, ValidationError};

/// Maximum number of bound parameters per statement.
///
/// SQLite builds may be compiled with a limit as low as 999
/// (SQLITE_MAX_VARIABLE_NUMBER); 500 leaves room for the other parameters
/// of a query.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Chunks `items` so that each chunk binds at most
/// [`SQLITE_MAX_PARAMS_CHUNK`] parameters, given `params_per_item` each.
pub fn chunk_for_sqlite<T>(items: &[T], params_per_item: usize) -> impl Iterator<Item = &[T]> {
    let per_chunk = (SQLITE_MAX_PARAMS_CHUNK / params_per_item.max(1)).max(1);
    items.chunks(per_chunk)
}

/// Quotes an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Parses a decimal stored as text. Empty strings read as NULL.
pub fn parse_decimal(column: &str, raw: Option<&str>) -> Result<Option<Decimal>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map(Some)
            .map_err(|e| {
                ValidationError::InvalidInput(format!("column {}: '{}' is not a decimal ({})", column, s, e))
                    .into()
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_chunk_for_sqlite_empty() {
        let items: Vec<i32> = vec![];
        assert_eq!(chunk_for_sqlite(&items, 10).count(), 0);
    }

    #[test]
    fn test_chunk_for_sqlite_respects_params_per_item() {
        let items: Vec<i32> = (0..120).collect();
        let chunks: Vec<_> = chunk_for_sqlite(&items, 10).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 50);
        assert_eq!(chunks[2].len(), 20);
    }

    #[test]
    fn test_chunk_for_sqlite_wide_rows_still_progress() {
        let items: Vec<i32> = (0..3).collect();
        assert_eq!(chunk_for_sqlite(&items, 2_000).count(), 3);
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("temp_s1_ledgers"), "\"temp_s1_ledgers\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("amount", Some("12.50")).unwrap(), Some(dec!(12.50)));
        assert_eq!(parse_decimal("amount", Some("1e-3")).unwrap(), Some(dec!(0.001)));
        assert_eq!(parse_decimal("amount", Some("")).unwrap(), None);
        assert_eq!(parse_decimal("amount", None).unwrap(), None);
        assert!(parse_decimal("amount", Some("abc")).is_err());
    }
}
