use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::{is_usd, usd_pair_symbol};
use crate::errors::Result;

/// Historical close prices keyed by candle symbol and timestamp.
#[async_trait]
pub trait CandlePriceSource: Send + Sync {
    /// Nearest known close of `symbol_pair` around `mts`, `None` when the
    /// symbol has no candles at all.
    async fn price_at(&self, symbol_pair: &str, mts: i64) -> Result<Option<Decimal>>;
}

/// USD price of one unit of `currency` at `mts`.
pub async fn usd_price(
    source: &dyn CandlePriceSource,
    currency: &str,
    mts: i64,
) -> Result<Option<Decimal>> {
    if is_usd(currency) {
        return Ok(Some(Decimal::ONE));
    }
    source.price_at(&usd_pair_symbol(currency), mts).await
}

/// In-memory candle closes for report computations that price many points
/// over a known range.
#[derive(Debug, Clone, Default)]
pub struct CandlePriceCache {
    closes: HashMap<String, BTreeMap<i64, Decimal>>,
}

impl CandlePriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol_pair: &str, mts: i64, close: Decimal) {
        self.closes
            .entry(symbol_pair.to_string())
            .or_default()
            .insert(mts, close);
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Latest close at or before `mts`, else the earliest after it.
    pub fn lookup(&self, symbol_pair: &str, mts: i64) -> Option<Decimal> {
        let series = self.closes.get(symbol_pair)?;
        series
            .range(..=mts)
            .next_back()
            .or_else(|| series.range(mts..).next())
            .map(|(_, close)| *close)
    }
}

#[async_trait]
impl CandlePriceSource for CandlePriceCache {
    async fn price_at(&self, symbol_pair: &str, mts: i64) -> Result<Option<Decimal>> {
        Ok(self.lookup(symbol_pair, mts))
    }
}
