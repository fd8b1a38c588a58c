use log::{debug, info};
use std::sync::Arc;

use super::{SubAccountBalanceReplayer, SubAccountLedgerSource};
use crate::errors::{DataIntegrityError, Result};
use crate::settings::SyncSettings;
use crate::users::Authenticator;
use crate::utils::time_utils::CooperativeYield;

/// Recomputes consolidated ledger balances of sub-account users, batch by
/// batch, starting at the earliest row not yet recalculated.
pub struct SubAccountRecalcService {
    source: Arc<dyn SubAccountLedgerSource>,
    authenticator: Arc<dyn Authenticator>,
    settings: SyncSettings,
}

impl SubAccountRecalcService {
    pub fn new(
        source: Arc<dyn SubAccountLedgerSource>,
        authenticator: Arc<dyn Authenticator>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            authenticator,
            settings,
        }
    }

    /// Returns the number of rows rewritten.
    pub async fn execute(&self, run_id: Option<i64>) -> Result<usize> {
        let Some(first) = self.source.get_first_unrecalced(run_id)? else {
            return Ok(0);
        };

        let sub_users = self.authenticator.get_sub_account_map()?;
        if sub_users.is_empty() {
            // Inside a run the rows were written for a sub-account user.
            if run_id.is_some() {
                return Err(DataIntegrityError::SubAccountAuthMissing {
                    user_id: first.user_id,
                }
                .into());
            }
            debug!("No sub-account users, ledger balances left as is");
            return Ok(0);
        }

        let mut replayer = SubAccountBalanceReplayer::new(sub_users);
        let mut yielder = CooperativeYield::new(self.settings.yield_threshold());
        let batch_size = self.settings.recalc_batch_size;
        let mut from_mts = first.mts;
        let mut skip_row_ids: Vec<i64> = Vec::new();
        let mut rewritten = 0;

        for _ in 0..self.settings.max_batches_per_collection {
            tokio::task::yield_now().await;

            let rows = self
                .source
                .get_rows_from(run_id, from_mts, &skip_row_ids, batch_size)?;
            let Some(last_mts) = rows.last().map(|r| r.mts) else {
                break;
            };

            let mut recalced = Vec::with_capacity(rows.len());
            for row in &rows {
                yielder.tick().await;

                let key = row.balance_key();
                if !replayer.is_seeded(&key) {
                    let mut priors = Vec::new();
                    for sub_user_id in replayer.sub_users_of(row.user_id) {
                        if let Some(prior) =
                            self.source
                                .get_latest_before(run_id, &key, *sub_user_id, row.mts)?
                        {
                            priors.push(prior);
                        }
                    }
                    replayer.seed(&key, priors);
                }
                recalced.push(replayer.replay(row));
            }

            rewritten += self.source.write_recalced(run_id, recalced).await?;

            let tail = rows.iter().filter(|r| r.mts == last_mts).map(|r| r.row_id);
            if last_mts != from_mts {
                skip_row_ids.clear();
            }
            skip_row_ids.extend(tail);
            from_mts = last_mts;

            if (rows.len() as i64) < batch_size {
                break;
            }
        }

        info!("Recalculated {} sub-account ledger balances", rewritten);
        Ok(rewritten)
    }
}
