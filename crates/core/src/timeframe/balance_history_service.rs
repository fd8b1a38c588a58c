use log::debug;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{regroup_weekly, BalanceBucket, Timeframe, WalletBalance, WalletHistorySource};
use crate::conversion::{usd_price, CandlePriceSource};
use crate::errors::{Error, Result};
use crate::settings::SyncSettings;
use crate::utils::time_utils::CooperativeYield;

type WalletKey = (String, String);

/// Reconstructs wallet balances at the close of every bucket in a range.
pub struct BalanceHistoryService {
    source: Arc<dyn WalletHistorySource>,
    prices: Arc<dyn CandlePriceSource>,
    settings: SyncSettings,
}

impl BalanceHistoryService {
    pub fn new(
        source: Arc<dyn WalletHistorySource>,
        prices: Arc<dyn CandlePriceSource>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            prices,
            settings,
        }
    }

    /// Buckets ascending by start. Bucket zero is seeded from the wallets as
    /// of `start`; every bucket carries the previous balances forward and
    /// overlays the ledger rows that fall inside it.
    pub async fn get_balance_history(
        &self,
        user_id: i64,
        timeframe: Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<BalanceBucket>> {
        if start > end {
            return Err(Error::BadRequest(format!(
                "Balance history start {} is after end {}",
                start, end
            )));
        }
        let bounds = timeframe.bucket_bounds(start, end).ok_or_else(|| {
            Error::BadRequest(format!("Range {}..{} is out of bounds", start, end))
        })?;

        let mut wallets: BTreeMap<WalletKey, Decimal> = self
            .source
            .get_wallets_at(user_id, start)?
            .into_iter()
            .map(|w| ((w.wallet, w.currency), w.balance))
            .collect();

        let mut rows = self
            .source
            .get_grouped_balances(user_id, timeframe, start, end)?;
        if timeframe == Timeframe::Week {
            rows = regroup_weekly(rows);
        }
        let mut rows = rows.into_iter().peekable();

        let mut yielder = CooperativeYield::new(self.settings.yield_threshold());
        let mut buckets = Vec::with_capacity(bounds.len());

        for (from, next) in bounds {
            yielder.tick().await;

            while let Some(row) = rows.next_if(|r| r.mts < next) {
                wallets.insert((row.wallet, row.currency), row.balance);
            }

            let closing_mts = (next - 1).min(end);
            buckets.push(self.value_bucket(from, closing_mts, &wallets).await?);
        }

        Ok(buckets)
    }

    async fn value_bucket(
        &self,
        mts: i64,
        closing_mts: i64,
        wallets: &BTreeMap<WalletKey, Decimal>,
    ) -> Result<BalanceBucket> {
        let mut per_currency: BTreeMap<&str, Decimal> = BTreeMap::new();
        for ((_, currency), balance) in wallets {
            *per_currency.entry(currency.as_str()).or_default() += *balance;
        }

        let mut forex_usd = Decimal::ZERO;
        let mut crypto_usd = Decimal::ZERO;
        let mut unpriced = Vec::new();

        for (currency, total) in per_currency {
            if total.is_zero() {
                continue;
            }
            let Some(price) = usd_price(self.prices.as_ref(), currency, closing_mts).await? else {
                debug!("No USD price for {} at {}, left out of bucket", currency, closing_mts);
                unpriced.push(currency.to_string());
                continue;
            };

            if self.settings.is_forex(currency) {
                forex_usd += total * price;
            } else {
                crypto_usd += total * price;
            }
        }

        let balances = wallets
            .iter()
            .map(|((wallet, currency), balance)| WalletBalance {
                wallet: wallet.clone(),
                currency: currency.clone(),
                balance: *balance,
            })
            .collect();

        Ok(BalanceBucket {
            mts,
            closing_mts,
            balances,
            forex_usd,
            crypto_usd,
            total_usd: forex_usd + crypto_usd,
            unpriced,
        })
    }
}
