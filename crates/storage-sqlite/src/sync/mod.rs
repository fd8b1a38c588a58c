//! SQLite storage for the sync engine: staging tables, run queue and
//! per-partition step records.

pub mod queue;
pub mod staging;
pub mod steps;

pub use queue::{SyncQueueDB, SyncQueueRepository};
pub use staging::{merge_run_tables, StagingRepository};
pub use steps::{SyncUserStepDB, SyncUserStepRepository};
