use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result, ValidationError};
use crate::utils::time_utils::datetime_from_ms;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
        }
    }

    /// Group key format. Storage groups with the same pattern through
    /// SQLite `strftime`, so `%W` weeks split at year boundaries.
    pub fn strftime_format(&self) -> &'static str {
        match self {
            Timeframe::Day => "%Y-%m-%d",
            Timeframe::Week => "%Y-%W",
            Timeframe::Month => "%Y-%m",
            Timeframe::Year => "%Y",
        }
    }

    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start_date(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Timeframe::Day => Some(date),
            Timeframe::Week => {
                date.checked_sub_signed(Duration::days(date.weekday().num_days_from_monday().into()))
            }
            Timeframe::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            Timeframe::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        }
    }

    pub fn next_bucket_date(&self, bucket_start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Timeframe::Day => bucket_start.succ_opt(),
            Timeframe::Week => bucket_start.checked_add_signed(Duration::days(7)),
            Timeframe::Month => {
                let (year, month) = if bucket_start.month() == 12 {
                    (bucket_start.year() + 1, 1)
                } else {
                    (bucket_start.year(), bucket_start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
            }
            Timeframe::Year => NaiveDate::from_ymd_opt(bucket_start.year() + 1, 1, 1),
        }
    }

    /// Bucket start, as epoch millis, of the bucket containing `mts`.
    pub fn bucket_start(&self, mts: i64) -> Option<i64> {
        let date = datetime_from_ms(mts)?.date_naive();
        self.bucket_start_date(date).and_then(date_to_ms)
    }

    /// `[start, next)` bounds of every bucket touching `[start, end]`,
    /// ascending. The first bucket is the one containing `start`.
    pub fn bucket_bounds(&self, start: i64, end: i64) -> Option<Vec<(i64, i64)>> {
        let mut date = self.bucket_start_date(datetime_from_ms(start)?.date_naive())?;
        let mut bounds = Vec::new();
        loop {
            let from = date_to_ms(date)?;
            if from > end {
                break;
            }
            let next = self.next_bucket_date(date)?;
            bounds.push((from, date_to_ms(next)?));
            date = next;
        }
        Some(bounds)
    }

    pub fn group_key(&self, mts: i64) -> Option<String> {
        datetime_from_ms(mts).map(|dt| dt.format(self.strftime_format()).to_string())
    }
}

fn date_to_ms(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "year" => Ok(Timeframe::Year),
            other => Err(
                ValidationError::InvalidInput(format!("Unknown timeframe '{}'", other)).into(),
            ),
        }
    }
}

/// Balance of one currency in one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub wallet: String,
    pub currency: String,
    pub balance: Decimal,
}

/// Last ledger balance of a (wallet, currency) inside one strftime group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceGroupRow {
    pub group_key: String,
    pub mts: i64,
    pub wallet: String,
    pub currency: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceBucket {
    /// Bucket start.
    pub mts: i64,
    /// Instant the bucket is priced at: next bucket start minus 1ms, capped
    /// at the report end.
    pub closing_mts: i64,
    pub balances: Vec<WalletBalance>,
    pub forex_usd: Decimal,
    pub crypto_usd: Decimal,
    pub total_usd: Decimal,
    /// Currencies left out of the totals for want of a price.
    pub unpriced: Vec<String>,
}

/// Ledger-derived wallet balances of one user.
pub trait WalletHistorySource: Send + Sync {
    /// Latest balance per (wallet, currency) at or before `mts`.
    fn get_wallets_at(&self, user_id: i64, mts: i64) -> Result<Vec<WalletBalance>>;

    /// Last balance per (group, wallet, currency) for ledger rows with
    /// `start < mts <= end`, ascending by `mts`.
    fn get_grouped_balances(
        &self,
        user_id: i64,
        timeframe: Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<BalanceGroupRow>>;
}
