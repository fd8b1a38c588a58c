use log::{debug, info};
use rust_decimal::Decimal;
use std::sync::Arc;

use super::{
    GainKind, MovementRecord, RealizedGain, TaxEvent, TaxEventKind, TaxEventSource,
    TaxLotCalculator, TaxLotStrategy, TaxReport, TradeRecord, UnrealizedGain, DERIVATIVES_ASSET,
};
use crate::conversion::{is_usd, split_symbol_pair, usd_price, CandlePriceSource};
use crate::errors::{DataIntegrityError, Error, Result};
use crate::settings::SyncSettings;

/// Builds transaction tax reports from committed trades and movements.
pub struct TaxReportService {
    source: Arc<dyn TaxEventSource>,
    prices: Arc<dyn CandlePriceSource>,
    settings: SyncSettings,
}

impl TaxReportService {
    pub fn new(
        source: Arc<dyn TaxEventSource>,
        prices: Arc<dyn CandlePriceSource>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            prices,
            settings,
        }
    }

    pub async fn get_transaction_tax_report(
        &self,
        user_id: i64,
        start: i64,
        end: i64,
        strategy: TaxLotStrategy,
    ) -> Result<TaxReport> {
        if start > end {
            return Err(Error::BadRequest(format!(
                "Report start {} is after end {}",
                start, end
            )));
        }

        let trades = self.source.get_trades_until(user_id, end)?;
        let movements = self.source.get_movements_until(user_id, end)?;

        let (spot, non_spot): (Vec<_>, Vec<_>) = trades.into_iter().partition(|t| t.is_spot());

        let mut events = Vec::with_capacity(spot.len() + movements.len());
        for trade in &spot {
            if let Some(event) = self.price_trade(trade).await? {
                events.push(event);
            }
        }
        for movement in &movements {
            if let Some(event) = self.price_movement(movement).await? {
                events.push(event);
            }
        }

        let calculator = TaxLotCalculator::new(strategy, self.settings.yield_threshold());
        let outcome = calculator.compute(events, start, end).await?;

        let mut realized = outcome.realized;
        if let Some(aggregate) = derivatives_aggregate(&non_spot, start) {
            realized.push(aggregate);
        }

        let mut unrealized = Vec::with_capacity(outcome.open.len());
        for position in &outcome.open {
            let price = self.require_usd_price(&position.asset, end).await?;
            let market_value = position.amount * price;
            unrealized.push(UnrealizedGain {
                asset: position.asset.clone(),
                amount: position.amount,
                cost: position.cost,
                market_value,
                gain_or_loss: market_value - position.cost,
                valued_at: end,
            });
        }

        info!(
            "Tax report for user {}: {} realized, {} unrealized ({})",
            user_id,
            realized.len(),
            unrealized.len(),
            strategy
        );

        Ok(TaxReport {
            start,
            end,
            strategy,
            realized,
            unrealized,
        })
    }

    /// Prices the base leg of a spot trade. USD-quoted pairs use the execution
    /// price; other quotes are priced through candles.
    ///
    /// Each trade yields one event for its base currency only. On a cross pair
    /// such as `tETHBTC` the quote leg (BTC) is neither acquired nor disposed
    /// of in the lot books; its price only converts the base leg to USD.
    async fn price_trade(&self, trade: &TradeRecord) -> Result<Option<TaxEvent>> {
        if trade.exec_amount.is_zero() || trade.exec_price.is_zero() {
            debug!("Skipping trade {} without amount or price", trade.id);
            return Ok(None);
        }

        let (first, last) = split_symbol_pair(&trade.symbol)?;
        if is_usd(&first) {
            return Ok(None);
        }

        let price_usd = if is_usd(&last) {
            trade.exec_price
        } else {
            let last_usd = self.require_usd_price(&last, trade.mts_create).await?;
            match usd_price(self.prices.as_ref(), &first, trade.mts_create).await? {
                Some(price) => price,
                None => trade.exec_price * last_usd,
            }
        };

        Ok(Some(TaxEvent {
            asset: first,
            mts: trade.mts_create,
            amount: trade.exec_amount,
            price_usd,
            kind: TaxEventKind::Trade,
        }))
    }

    async fn price_movement(&self, movement: &MovementRecord) -> Result<Option<TaxEvent>> {
        if movement.amount.is_zero() || is_usd(&movement.currency) {
            return Ok(None);
        }

        let price_usd = match movement.amount_usd {
            Some(amount_usd) => (amount_usd / movement.amount).abs(),
            None => {
                self.require_usd_price(&movement.currency, movement.mts_updated)
                    .await?
            }
        };

        Ok(Some(TaxEvent {
            asset: movement.currency.clone(),
            mts: movement.mts_updated,
            amount: movement.amount,
            price_usd,
            kind: TaxEventKind::Movement,
        }))
    }

    async fn require_usd_price(&self, currency: &str, mts: i64) -> Result<Decimal> {
        usd_price(self.prices.as_ref(), currency, mts)
            .await?
            .ok_or_else(|| {
                DataIntegrityError::CurrencyConversion {
                    currency: currency.to_string(),
                    mts,
                }
                .into()
            })
    }
}

/// One placeholder record summing the traded volume of margin and
/// derivative trades inside the window.
fn derivatives_aggregate(trades: &[TradeRecord], start: i64) -> Option<RealizedGain> {
    let in_window: Vec<_> = trades.iter().filter(|t| t.mts_create >= start).collect();
    if in_window.is_empty() {
        return None;
    }

    Some(RealizedGain {
        asset: DERIVATIVES_ASSET.to_string(),
        amount: in_window.iter().map(|t| t.exec_amount.abs()).sum(),
        proceeds: Decimal::ZERO,
        cost: Decimal::ZERO,
        gain_or_loss: Decimal::ZERO,
        acquired_at: None,
        sold_at: None,
        kind: GainKind::Derivative,
    })
}
