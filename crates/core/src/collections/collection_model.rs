use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, SyncError};

/// A synced collection. The set is closed; every collection has a fixed
/// column model in [`CollectionSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Ledgers,
    Trades,
    Movements,
    Candles,
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Surrogate autoincrement key (`_id`).
    Id,
    BigInt,
    Integer,
    Text,
    /// Decimal amount stored as a text string.
    Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnType,
    pub nullable: bool,
}

const fn col(name: &'static str, kind: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        kind,
        nullable: false,
    }
}

const fn opt(name: &'static str, kind: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        kind,
        nullable: true,
    }
}

/// Column model and sync metadata of one collection.
#[derive(Debug)]
pub struct CollectionSchema {
    pub collection: Collection,
    pub table_name: &'static str,
    pub columns: &'static [ColumnDef],
    pub unique_key: &'static [&'static str],
    pub date_field: Option<&'static str>,
    pub symbol_field: Option<&'static str>,
    pub timeframe_field: Option<&'static str>,
    pub has_user: bool,
    pub has_sub_user: bool,
    /// Values can change after creation, so every sync re-reads full history.
    pub is_mutable: bool,
}

pub const ID_COLUMN: &str = "_id";
pub const IS_BALANCE_RECALCED_COLUMN: &str = "_is_balance_recalced";

use ColumnType::*;

static LEDGERS: CollectionSchema = CollectionSchema {
    collection: Collection::Ledgers,
    table_name: "ledgers",
    columns: &[
        col("_id", Id),
        col("id", BigInt),
        col("currency", Text),
        col("mts", BigInt),
        col("amount", Decimal),
        opt("amount_usd", Decimal),
        opt("balance", Decimal),
        opt("balance_usd", Decimal),
        opt("_native_balance", Decimal),
        opt("_native_balance_usd", Decimal),
        opt("description", Text),
        opt("wallet", Text),
        col("user_id", BigInt),
        opt("sub_user_id", BigInt),
        opt(IS_BALANCE_RECALCED_COLUMN, Integer),
    ],
    unique_key: &["id", "user_id", "sub_user_id"],
    date_field: Some("mts"),
    symbol_field: Some("currency"),
    timeframe_field: None,
    has_user: true,
    has_sub_user: true,
    is_mutable: false,
};

static TRADES: CollectionSchema = CollectionSchema {
    collection: Collection::Trades,
    table_name: "trades",
    columns: &[
        col("_id", Id),
        col("id", BigInt),
        col("symbol", Text),
        col("mts_create", BigInt),
        opt("order_id", BigInt),
        col("exec_amount", Decimal),
        col("exec_price", Decimal),
        opt("order_type", Text),
        opt("order_price", Decimal),
        opt("fee", Decimal),
        opt("fee_currency", Text),
        col("user_id", BigInt),
        opt("sub_user_id", BigInt),
    ],
    unique_key: &["id", "symbol", "user_id", "sub_user_id"],
    date_field: Some("mts_create"),
    symbol_field: Some("symbol"),
    timeframe_field: None,
    has_user: true,
    has_sub_user: true,
    is_mutable: false,
};

static MOVEMENTS: CollectionSchema = CollectionSchema {
    collection: Collection::Movements,
    table_name: "movements",
    columns: &[
        col("_id", Id),
        col("id", BigInt),
        col("currency", Text),
        opt("currency_name", Text),
        opt("mts_started", BigInt),
        col("mts_updated", BigInt),
        opt("status", Text),
        col("amount", Decimal),
        opt("amount_usd", Decimal),
        opt("fees", Decimal),
        opt("destination_address", Text),
        opt("transaction_id", Text),
        opt("note", Text),
        col("user_id", BigInt),
        opt("sub_user_id", BigInt),
    ],
    unique_key: &["id", "user_id", "sub_user_id"],
    date_field: Some("mts_updated"),
    symbol_field: Some("currency"),
    timeframe_field: None,
    has_user: true,
    has_sub_user: true,
    is_mutable: true,
};

static CANDLES: CollectionSchema = CollectionSchema {
    collection: Collection::Candles,
    table_name: "candles",
    columns: &[
        col("_id", Id),
        col("mts", BigInt),
        opt("open", Decimal),
        col("close", Decimal),
        opt("high", Decimal),
        opt("low", Decimal),
        opt("volume", Decimal),
        col("_symbol", Text),
        col("_timeframe", Text),
    ],
    unique_key: &["_symbol", "_timeframe", "mts"],
    date_field: Some("mts"),
    symbol_field: Some("_symbol"),
    timeframe_field: Some("_timeframe"),
    has_user: false,
    has_sub_user: false,
    is_mutable: false,
};

const ALL: &[Collection] = &[
    Collection::Ledgers,
    Collection::Trades,
    Collection::Movements,
    Collection::Candles,
];

impl Collection {
    pub fn all() -> &'static [Collection] {
        ALL
    }

    pub fn schema(self) -> &'static CollectionSchema {
        match self {
            Collection::Ledgers => &LEDGERS,
            Collection::Trades => &TRADES,
            Collection::Movements => &MOVEMENTS,
            Collection::Candles => &CANDLES,
        }
    }

    pub fn table_name(self) -> &'static str {
        self.schema().table_name
    }

    pub fn from_table_name(name: &str) -> Option<Collection> {
        ALL.iter().copied().find(|c| c.table_name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::from_table_name(s).ok_or_else(|| SyncError::UnknownCollection(s.to_string()).into())
    }
}

impl CollectionSchema {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Every column except the surrogate key, in declaration order.
    pub fn data_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns.iter().filter(|c| c.kind != ColumnType::Id)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}
