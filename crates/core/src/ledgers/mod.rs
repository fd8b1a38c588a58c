//! Consolidated ledger balances for users with sub-accounts.

mod ledger_model;
mod sub_account_recalc_service;
mod sub_account_replayer;

pub use ledger_model::*;
pub use sub_account_recalc_service::*;
pub use sub_account_replayer::*;
