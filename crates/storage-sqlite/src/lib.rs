//! SQLite storage implementation for Ledgersync.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the repository traits defined in `ledgersync-core` and contains:
//! - Database connection pooling and the single writer actor
//! - Diesel migrations for the service tables
//! - Collection and staging table DDL generated from the collection registry
//! - Repository implementations for sync, conversion, ledgers, tax and users
//! - Database maintenance (clear, remove, backup and restore)
//!
//! # Architecture
//!
//! This crate is the only place in the application where Diesel dependencies exist.
//! The `core` crate and the `sync-worker` app are database-agnostic and work with traits.
//!
//! ```text
//! core (domain)        apps/sync-worker
//!       │                      │
//!       └──────────┬───────────┘
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod collections;
pub mod conversion;
pub mod ledgers;
pub mod maintenance;
pub mod progress;
pub mod sync;
pub mod tax;
pub mod users;

#[cfg(test)]
mod test_support;

// Re-export database utilities
pub use db::{
    backup_database, create_pool, get_connection, get_db_path, init, list_backups,
    restore_database, run_migrations, spawn_writer, DbConnection, DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export from ledgersync-core for convenience
pub use ledgersync_core::errors::{DatabaseError, Error, Result};
