//! Balance snapshots grouped by day, week, month or year.

mod balance_history_service;
mod timeframe_model;
mod weekly_regroup;

pub use balance_history_service::*;
pub use timeframe_model::*;
pub use weekly_regroup::*;
