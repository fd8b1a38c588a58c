//! SQLite tables of the synced collections.
//!
//! Collection tables are not part of the embedded migrations: their DDL is
//! generated from the collection registry so that staging tables are
//! guaranteed to match their main table.

mod ddl;
mod repository;

pub use ddl::*;
pub use repository::CollectionRepository;

#[cfg(test)]
mod tests;
