//! Whole-database maintenance requested over the host message channel.

mod repository;

pub use repository::MaintenanceRepository;
