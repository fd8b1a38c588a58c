use log::debug;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use super::{
    GainKind, Lot, OpenLot, OpenPosition, RealizedGain, TaxEvent, TaxLotAccumulator,
    TaxLotStrategy,
};
use crate::errors::{DataIntegrityError, Result};
use crate::utils::time_utils::CooperativeYield;

/// One asset's open lots and the cost still attached to them.
///
/// Cost basis is the running weighted average `open_cost / open_amount`; the
/// strategy only decides which lots a disposal consumes.
#[derive(Debug, Clone, Default)]
struct AssetBook {
    lots: VecDeque<Lot>,
    open_cost: Decimal,
    totals: TaxLotAccumulator,
}

struct Disposal {
    cost: Decimal,
    acquired_at: Option<i64>,
}

impl AssetBook {
    fn open_amount(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.amount).sum()
    }

    fn acquire(&mut self, amount: Decimal, price_usd: Decimal, mts: i64) {
        self.lots.push_back(Lot {
            amount,
            acquired_at: mts,
        });
        self.open_cost += amount * price_usd;
        self.totals.record_buy(amount, price_usd);
    }

    /// Draws `amount` from the open lots. A disposal larger than the open
    /// position has no cost basis for its remainder and is rejected untouched.
    fn dispose(
        &mut self,
        asset: &str,
        mts: i64,
        amount: Decimal,
        price_usd: Decimal,
        strategy: TaxLotStrategy,
    ) -> Result<Disposal> {
        let open = self.open_amount();
        if amount > open {
            return Err(DataIntegrityError::InsufficientLots {
                asset: asset.to_string(),
                mts,
                shortfall: amount - open,
            }
            .into());
        }
        self.totals.record_sell(amount, price_usd);

        // Closing the whole position releases the exact remaining cost.
        let cost = if amount == open {
            self.open_cost
        } else {
            self.open_cost * amount / open
        };
        self.open_cost -= cost;

        let mut remaining = amount;
        let mut acquired_at = None;
        while remaining > Decimal::ZERO {
            let lot = match strategy {
                TaxLotStrategy::Fifo => self.lots.front_mut(),
                TaxLotStrategy::Lifo => self.lots.back_mut(),
            };
            let Some(lot) = lot else {
                break;
            };
            acquired_at.get_or_insert(lot.acquired_at);

            if lot.amount > remaining {
                lot.amount -= remaining;
                remaining = Decimal::ZERO;
            } else {
                remaining -= lot.amount;
                match strategy {
                    TaxLotStrategy::Fifo => self.lots.pop_front(),
                    TaxLotStrategy::Lifo => self.lots.pop_back(),
                };
            }
        }

        Ok(Disposal { cost, acquired_at })
    }

    fn open_position(&self, asset: &str) -> Option<OpenPosition> {
        let amount = self.open_amount();
        if amount <= Decimal::ZERO {
            return None;
        }

        let mut allocated = Decimal::ZERO;
        let last = self.lots.len() - 1;
        let lots = self
            .lots
            .iter()
            .enumerate()
            .map(|(i, lot)| {
                let cost = if i == last {
                    self.open_cost - allocated
                } else {
                    self.open_cost * lot.amount / amount
                };
                allocated += cost;
                OpenLot {
                    amount: lot.amount,
                    cost,
                    acquired_at: lot.acquired_at,
                }
            })
            .collect();

        Some(OpenPosition {
            asset: asset.to_string(),
            amount,
            cost: self.open_cost,
            lots,
        })
    }
}

/// Result of replaying a user's priced events.
#[derive(Debug, Clone, Default)]
pub struct TaxLotOutcome {
    /// Disposals inside the reporting window, in processing order.
    pub realized: Vec<RealizedGain>,
    /// Positions still open at the end of the window, by asset.
    pub open: Vec<OpenPosition>,
    pub totals: BTreeMap<String, TaxLotAccumulator>,
}

impl TaxLotOutcome {
    pub fn realized_cost(&self) -> Decimal {
        self.realized.iter().map(|g| g.cost).sum()
    }

    pub fn open_cost(&self) -> Decimal {
        self.open.iter().map(|p| p.cost).sum()
    }
}

/// Matches disposals against open lots in strict timestamp order.
#[derive(Debug, Clone)]
pub struct TaxLotCalculator {
    strategy: TaxLotStrategy,
    yield_threshold: Duration,
}

impl TaxLotCalculator {
    pub fn new(strategy: TaxLotStrategy, yield_threshold: Duration) -> Self {
        Self {
            strategy,
            yield_threshold,
        }
    }

    /// Replays every event up to `end`. Events before `start` only build the
    /// books that carry into the window; disposals are reported from `start`.
    ///
    /// Fails with [`DataIntegrityError::InsufficientLots`] when a disposal,
    /// in or before the window, exceeds the open position of its asset.
    pub async fn compute(
        &self,
        mut events: Vec<TaxEvent>,
        start: i64,
        end: i64,
    ) -> Result<TaxLotOutcome> {
        events.sort_by_key(|e| e.mts);

        let mut books: BTreeMap<String, AssetBook> = BTreeMap::new();
        let mut realized = Vec::new();
        let mut yielder = CooperativeYield::new(self.yield_threshold);

        for event in events.into_iter().filter(|e| e.mts <= end) {
            yielder.tick().await;

            if event.amount.is_zero() {
                continue;
            }
            let book = books.entry(event.asset.clone()).or_default();

            if event.is_acquisition() {
                book.acquire(event.amount, event.price_usd, event.mts);
                continue;
            }

            let amount = event.amount.abs();
            let disposal =
                book.dispose(&event.asset, event.mts, amount, event.price_usd, self.strategy)?;
            if event.mts < start {
                continue;
            }

            let proceeds = amount * event.price_usd;
            realized.push(RealizedGain {
                asset: event.asset,
                amount,
                proceeds,
                cost: disposal.cost,
                gain_or_loss: proceeds - disposal.cost,
                acquired_at: disposal.acquired_at,
                sold_at: Some(event.mts),
                kind: GainKind::Spot,
            });
        }

        debug!(
            "Tax lots replayed for {} assets, {} disposals in window",
            books.len(),
            realized.len()
        );

        let open = books
            .iter()
            .filter_map(|(asset, book)| book.open_position(asset))
            .collect();
        let totals = books
            .into_iter()
            .map(|(asset, book)| (asset, book.totals))
            .collect();

        Ok(TaxLotOutcome {
            realized,
            open,
            totals,
        })
    }
}
