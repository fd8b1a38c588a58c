//! SQLite storage implementation for the run progress row.

mod model;
mod repository;

pub use model::ProgressDB;
pub use repository::ProgressRepository;

// Re-export trait from core for convenience
pub use ledgersync_core::progress::ProgressRepositoryTrait;
