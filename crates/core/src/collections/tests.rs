use super::*;

#[test]
fn test_every_collection_has_surrogate_key_and_unique_columns() {
    for collection in Collection::all() {
        let schema = collection.schema();
        assert_eq!(schema.columns[0].name, ID_COLUMN);
        for key in schema.unique_key {
            assert!(schema.has_column(key), "{} lacks {}", schema.table_name, key);
        }
        if let Some(date) = schema.date_field {
            assert!(schema.has_column(date));
        }
    }
}

#[test]
fn test_table_names_round_trip_through_from_str() {
    assert_eq!("ledgers".parse::<Collection>().unwrap(), Collection::Ledgers);
    assert!("positions".parse::<Collection>().is_err());
    assert_eq!(Collection::Candles.to_string(), "candles");
}

#[test]
fn test_only_movements_are_mutable() {
    let mutable: Vec<_> = Collection::all()
        .iter()
        .filter(|c| c.schema().is_mutable)
        .collect();
    assert_eq!(mutable, vec![&Collection::Movements]);
}

#[test]
fn test_data_columns_skip_surrogate_key() {
    let names: Vec<_> = Collection::Candles
        .schema()
        .data_columns()
        .map(|c| c.name)
        .collect();
    assert!(!names.contains(&ID_COLUMN));
    assert_eq!(names.first(), Some(&"mts"));
}
