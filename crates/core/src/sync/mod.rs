//! Sync engine: run queue, per-partition step windows and staging tables.

mod staging_model;
mod sync_queue_model;
mod sync_queue_service;
mod sync_step_model;
mod sync_step_service;

pub use staging_model::*;
pub use sync_queue_model::*;
pub use sync_queue_service::*;
pub use sync_step_model::*;
pub use sync_step_service::*;
