//! Ledgersync Core - Domain models, services, and traits.
//!
//! This crate contains the sync engine and report logic for ledgersync.
//! It is database-agnostic and defines traits that are implemented
//! by the `storage-sqlite` crate.

pub mod collections;
pub mod constants;
pub mod conversion;
pub mod errors;
pub mod ledgers;
pub mod messaging;
pub mod platform;
pub mod progress;
pub mod settings;
pub mod sync;
pub mod tax;
pub mod timeframe;
pub mod users;
pub mod utils;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
