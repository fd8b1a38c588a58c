//! SQLite storage implementation for sync run jobs.

mod model;
mod repository;

pub use model::SyncQueueDB;
pub use repository::SyncQueueRepository;

// Re-export trait from core for convenience
pub use ledgersync_core::sync::SyncQueueRepositoryTrait;
