use super::*;
use crate::db::get_connection;
use crate::test_support::setup_db;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use ledgersync_core::collections::Collection;
use ledgersync_core::errors::ValidationError;
use serde_json::json;

#[derive(QueryableByName)]
struct AmountRow {
    #[diesel(sql_type = Text)]
    amount: String,
    #[diesel(sql_type = Nullable<Text>)]
    amount_usd: Option<String>,
}

fn amounts(db: &crate::test_support::TestDb) -> Vec<AmountRow> {
    let mut conn = get_connection(&db.pool).unwrap();
    diesel::sql_query("SELECT amount, amount_usd FROM ledgers ORDER BY _id")
        .load(&mut conn)
        .unwrap()
}

#[test]
fn test_unique_key_treats_null_as_value() {
    assert_eq!(
        unique_key_sql(Collection::Ledgers.schema()),
        "\"id\", \"user_id\", IFNULL(\"sub_user_id\", 0)"
    );
    assert_eq!(
        unique_key_sql(Collection::Candles.schema()),
        "\"_symbol\", \"_timeframe\", \"mts\""
    );
}

#[test]
fn test_candle_date_index_leads_with_symbol() {
    let statements = create_table_statements(Collection::Candles.schema(), "temp_s3_candles");
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"temp_s3_candles\""));
    assert!(statements[2].ends_with("(\"_symbol\", \"mts\")"));
}

#[tokio::test]
async fn test_insert_replaces_on_unique_key() {
    let db = setup_db();
    let repo = CollectionRepository::new(db.pool.clone(), db.writer.clone());

    repo.insert_elems(
        "ledgers",
        Collection::Ledgers,
        vec![json!({ "id": 1, "currency": "BTC", "mts": 10, "amount": "1.50000", "user_id": 1 })],
    )
    .await
    .unwrap();
    repo.insert_elems(
        "ledgers",
        Collection::Ledgers,
        vec![
            json!({ "id": 1, "currency": "BTC", "mts": 10, "amount": 2, "amount_usd": "1e2", "user_id": 1 }),
            json!({ "id": 1, "currency": "BTC", "mts": 10, "amount": "3", "user_id": 1, "sub_user_id": 4 }),
        ],
    )
    .await
    .unwrap();

    assert_eq!(repo.count_rows("ledgers").unwrap(), 2);
    let rows = amounts(&db);
    assert_eq!(rows[0].amount, "2");
    assert_eq!(rows[0].amount_usd.as_deref(), Some("100"));
    assert_eq!(rows[1].amount, "3");
}

#[tokio::test]
async fn test_missing_required_field_writes_nothing() {
    let db = setup_db();
    let repo = CollectionRepository::new(db.pool.clone(), db.writer.clone());

    let err = repo
        .insert_elems(
            "ledgers",
            Collection::Ledgers,
            vec![
                json!({ "id": 1, "currency": "BTC", "mts": 10, "amount": "1", "user_id": 1 }),
                json!({ "id": 2, "currency": "BTC", "mts": 11, "user_id": 1 }),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ledgersync_core::Error::Validation(ValidationError::MissingField(ref f)) if f == "amount"
    ));
    assert_eq!(repo.count_rows("ledgers").unwrap(), 0);
    assert_eq!(repo.insert_elems("ledgers", Collection::Ledgers, vec![]).await.unwrap(), 0);
}
