//! SQLite staging tables: one shadow table per collection and run.

mod repository;

pub use repository::{merge_run_tables, StagingRepository};

// Re-export trait from core for convenience
pub use ledgersync_core::sync::StagingRepositoryTrait;
