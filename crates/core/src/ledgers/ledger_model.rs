use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// The balance-relevant columns of one sub-user ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBalanceRow {
    /// Surrogate `_id` of the row in its table.
    pub row_id: i64,
    pub id: i64,
    pub mts: i64,
    pub wallet: String,
    pub currency: String,
    pub user_id: i64,
    pub sub_user_id: i64,
    pub native_balance: Option<Decimal>,
    pub native_balance_usd: Option<Decimal>,
}

impl LedgerBalanceRow {
    pub fn balance_key(&self) -> BalanceKey {
        BalanceKey {
            user_id: self.user_id,
            wallet: self.wallet.clone(),
            currency: self.currency.clone(),
        }
    }
}

/// A master user's (wallet, currency) slot that sub-users contribute to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BalanceKey {
    pub user_id: i64,
    pub wallet: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcedBalance {
    pub row_id: i64,
    pub balance: Option<Decimal>,
    pub balance_usd: Option<Decimal>,
}

/// Ledger access for the sub-account recalculation. `run_id` selects the
/// run's staging table; `None` works on the main table.
#[async_trait]
pub trait SubAccountLedgerSource: Send + Sync {
    /// Earliest sub-user row not recalculated yet.
    fn get_first_unrecalced(&self, run_id: Option<i64>) -> Result<Option<LedgerBalanceRow>>;

    /// Sub-user rows with `mts >= from_mts`, skipping `skip_row_ids`,
    /// ascending by (`mts`, `id`).
    fn get_rows_from(
        &self,
        run_id: Option<i64>,
        from_mts: i64,
        skip_row_ids: &[i64],
        limit: i64,
    ) -> Result<Vec<LedgerBalanceRow>>;

    /// Latest row of `sub_user_id` in `key` strictly before `mts`, looking at
    /// both main and staging when a run is given.
    fn get_latest_before(
        &self,
        run_id: Option<i64>,
        key: &BalanceKey,
        sub_user_id: i64,
        mts: i64,
    ) -> Result<Option<LedgerBalanceRow>>;

    /// Writes consolidated balances and marks the rows recalculated.
    async fn write_recalced(&self, run_id: Option<i64>, rows: Vec<RecalcedBalance>) -> Result<usize>;
}
