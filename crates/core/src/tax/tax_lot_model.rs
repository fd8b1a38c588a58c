use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result, ValidationError};

/// Asset name of the aggregate record standing in for non-spot trades.
pub const DERIVATIVES_ASSET: &str = "DERIVATIVES";

/// Which open lots a disposal draws down first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaxLotStrategy {
    #[default]
    Fifo,
    Lifo,
}

impl TaxLotStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxLotStrategy::Fifo => "FIFO",
            TaxLotStrategy::Lifo => "LIFO",
        }
    }
}

impl fmt::Display for TaxLotStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxLotStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(TaxLotStrategy::Fifo),
            "LIFO" => Ok(TaxLotStrategy::Lifo),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown tax lot strategy '{}'",
                other
            ))
            .into()),
        }
    }
}

/// A trade row as stored, before pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: i64,
    pub symbol: String,
    pub mts_create: i64,
    /// Positive for buys, negative for sells.
    pub exec_amount: Decimal,
    pub exec_price: Decimal,
    pub order_type: Option<String>,
}

impl TradeRecord {
    /// Margin and derivative trades are kept out of the lot books.
    pub fn is_spot(&self) -> bool {
        if crate::conversion::is_derivative_symbol(&self.symbol) {
            return false;
        }
        match self.order_type.as_deref() {
            Some(order_type) => order_type.starts_with("EXCHANGE"),
            None => true,
        }
    }
}

/// A deposit (positive amount) or withdrawal (negative amount).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRecord {
    pub id: i64,
    pub currency: String,
    pub mts_updated: i64,
    pub amount: Decimal,
    pub amount_usd: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaxEventKind {
    Trade,
    Movement,
}

/// An acquisition or disposal of `asset`, priced in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxEvent {
    pub asset: String,
    pub mts: i64,
    /// Positive acquires, negative disposes.
    pub amount: Decimal,
    pub price_usd: Decimal,
    pub kind: TaxEventKind,
}

impl TaxEvent {
    pub fn is_acquisition(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GainKind {
    Spot,
    Derivative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedGain {
    pub asset: String,
    pub amount: Decimal,
    pub proceeds: Decimal,
    pub cost: Decimal,
    pub gain_or_loss: Decimal,
    pub acquired_at: Option<i64>,
    pub sold_at: Option<i64>,
    pub kind: GainKind,
}

/// Running per-asset totals across one report computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxLotAccumulator {
    pub total_buy_amount: Decimal,
    pub total_cost_usd: Decimal,
    pub buy_weighted_price_usd: Decimal,
    pub total_sell_amount: Decimal,
    pub total_proceeds_usd: Decimal,
    pub sell_weighted_price_usd: Decimal,
}

impl TaxLotAccumulator {
    pub fn record_buy(&mut self, amount: Decimal, price_usd: Decimal) {
        self.total_buy_amount += amount;
        self.total_cost_usd += amount * price_usd;
        self.buy_weighted_price_usd = weighted(self.total_cost_usd, self.total_buy_amount);
    }

    pub fn record_sell(&mut self, amount: Decimal, price_usd: Decimal) {
        self.total_sell_amount += amount;
        self.total_proceeds_usd += amount * price_usd;
        self.sell_weighted_price_usd = weighted(self.total_proceeds_usd, self.total_sell_amount);
    }
}

fn weighted(total: Decimal, amount: Decimal) -> Decimal {
    if amount.is_zero() || total.is_zero() {
        Decimal::ZERO
    } else {
        total / amount
    }
}

/// An open lot. Cost lives on the owning book, not on the lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub amount: Decimal,
    pub acquired_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosition {
    pub asset: String,
    pub amount: Decimal,
    pub cost: Decimal,
    pub lots: Vec<OpenLot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLot {
    pub amount: Decimal,
    pub cost: Decimal,
    pub acquired_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrealizedGain {
    pub asset: String,
    pub amount: Decimal,
    pub cost: Decimal,
    pub market_value: Decimal,
    pub gain_or_loss: Decimal,
    pub valued_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxReport {
    pub start: i64,
    pub end: i64,
    pub strategy: TaxLotStrategy,
    pub realized: Vec<RealizedGain>,
    pub unrealized: Vec<UnrealizedGain>,
}

/// Trades and movements of one user up to a cut-off, any order.
pub trait TaxEventSource: Send + Sync {
    fn get_trades_until(&self, user_id: i64, end: i64) -> Result<Vec<TradeRecord>>;
    fn get_movements_until(&self, user_id: i64, end: i64) -> Result<Vec<MovementRecord>>;
}
