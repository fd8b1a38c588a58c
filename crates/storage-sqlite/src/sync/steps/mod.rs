//! SQLite storage implementation for per-partition sync steps.

mod model;
mod repository;

pub use model::SyncUserStepDB;
pub use repository::SyncUserStepRepository;

// Re-export trait from core for convenience
pub use ledgersync_core::sync::SyncUserStepRepositoryTrait;
