//! Core error types for ledgersync.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.
//!
//! Errors fall into four classes that callers treat differently:
//! - programmer/configuration errors ([`SyncError`], [`Error::Config`]) are fatal
//!   and never retried,
//! - transient network errors ([`Error::Network`]) may be retried by the caller,
//! - data-integrity errors ([`DataIntegrityError`]) abort the computation that
//!   hit them instead of substituting a zero,
//! - storage errors ([`DatabaseError`]) propagate after the transaction rolls back.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for ledgersync.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Sync engine error: {0}")]
    Sync(#[from] SyncError),

    #[error("Data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The remote platform could not be reached (ENET-class failure).
    #[error("Network unavailable: {0}")]
    Network(String),

    /// Surfaced to report callers when the platform is down.
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    /// Surfaced to report callers on malformed arguments.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// True for the distinct transient class the caller may retry.
    pub fn is_network_unavailable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::ServerUnavailable(_))
    }
}

/// Database-agnostic error type for storage operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    #[error("Database backup failed: {0}")]
    BackupFailed(String),

    #[error("Database restore failed: {0}")]
    RestoreFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Programmer and configuration errors raised by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid sync run id: {0}")]
    InvalidRunId(i64),

    #[error("Collection '{0}' is not registered")]
    UnknownCollection(String),

    #[error("Last synced info cannot be computed for collection '{0}'")]
    LastSyncedInfoGetting(String),

    #[error("Staging table '{table}' has no matching main collection")]
    UnmatchedStagingTable { table: String },

    /// A merge declared to join the caller's transaction found none open.
    #[error("Merge of run {0} expects an open transaction on its connection")]
    MergeOutsideTransaction(i64),

    #[error("Sync job {0} not found")]
    JobNotFound(i64),

    #[error("A waiter for state '{0}' is already pending")]
    WaiterAlreadyPending(String),

    #[error("Sync run was interrupted")]
    Interrupted,
}

/// Data-integrity failures. These abort the current computation.
#[derive(Error, Debug)]
pub enum DataIntegrityError {
    #[error("Symbol '{symbol}' cannot be separated into a currency pair")]
    CurrencyPairSeparation { symbol: String },

    #[error("No USD price for '{currency}' at {mts}")]
    CurrencyConversion { currency: String, mts: i64 },

    #[error("Sub-account auth is not available for user {user_id}")]
    SubAccountAuthMissing { user_id: i64 },

    #[error("Disposal of {asset} at {mts} exceeds open lots by {shortfall}")]
    InsufficientLots {
        asset: String,
        mts: i64,
        shortfall: rust_decimal::Decimal,
    },
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::Json(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Database(DatabaseError::Internal(err.to_string()))
    }
}
