use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::{BalanceKey, LedgerBalanceRow, RecalcedBalance};
use crate::users::SubAccountMap;

#[derive(Debug, Clone, Copy, Default)]
struct Contribution {
    balance: Option<Decimal>,
    balance_usd: Option<Decimal>,
}

impl From<&LedgerBalanceRow> for Contribution {
    fn from(row: &LedgerBalanceRow) -> Self {
        Self {
            balance: row.native_balance,
            balance_usd: row.native_balance_usd,
        }
    }
}

/// Replays sub-user ledger rows in ascending time order and yields the
/// master user's consolidated balance after each one.
///
/// The consolidated balance of a (wallet, currency) slot is the sum of each
/// sub-user's latest native balance in it. A row of a user without
/// sub-users keeps its native balance.
#[derive(Debug, Default)]
pub struct SubAccountBalanceReplayer {
    sub_users: SubAccountMap,
    slots: HashMap<BalanceKey, BTreeMap<i64, Contribution>>,
}

impl SubAccountBalanceReplayer {
    pub fn new(sub_users: SubAccountMap) -> Self {
        Self {
            sub_users,
            slots: HashMap::new(),
        }
    }

    pub fn sub_users_of(&self, user_id: i64) -> &[i64] {
        self.sub_users
            .get(&user_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_seeded(&self, key: &BalanceKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Opens `key` with the sub-users' balances from before the replay.
    pub fn seed<I>(&mut self, key: &BalanceKey, priors: I)
    where
        I: IntoIterator<Item = LedgerBalanceRow>,
    {
        let slot = self.slots.entry(key.clone()).or_default();
        for prior in priors {
            slot.insert(prior.sub_user_id, Contribution::from(&prior));
        }
    }

    pub fn replay(&mut self, row: &LedgerBalanceRow) -> RecalcedBalance {
        let native = RecalcedBalance {
            row_id: row.row_id,
            balance: row.native_balance,
            balance_usd: row.native_balance_usd,
        };
        let Some(sub_users) = self.sub_users.get(&row.user_id).filter(|s| !s.is_empty()) else {
            return native;
        };

        let slot = self.slots.entry(row.balance_key()).or_default();
        slot.insert(row.sub_user_id, Contribution::from(row));

        let contributions: Vec<Contribution> = sub_users
            .iter()
            .filter_map(|sub_user_id| slot.get(sub_user_id).copied())
            .collect();

        RecalcedBalance {
            row_id: row.row_id,
            balance: sum_present(contributions.iter().map(|c| c.balance))
                .or(native.balance),
            balance_usd: sum_present(contributions.iter().map(|c| c.balance_usd))
                .or(native.balance_usd),
        }
    }
}

fn sum_present(values: impl Iterator<Item = Option<Decimal>>) -> Option<Decimal> {
    values.flatten().fold(None, |acc, v| Some(acc.unwrap_or_default() + v))
}
