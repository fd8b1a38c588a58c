//! SQLite ledger queries for balance history and sub-account consolidation.

mod repository;

pub use repository::LedgerRepository;
