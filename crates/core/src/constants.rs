/// Prefix shared by every staging table: `temp_s{runId}_{collection}`.
pub const STAGING_TABLE_PREFIX: &str = "temp_s";

/// Rows fetched per conversion backfill batch.
pub const CONVERSION_BATCH_SIZE: i64 = 10_000;

/// Batch cap per collection per backfill invocation.
pub const MAX_BATCHES_PER_COLLECTION: usize = 1000;

/// Rows fetched per sub-account balance recalculation batch.
pub const RECALC_BATCH_SIZE: i64 = 20_000;

/// Interval of the progress emission tick while a run is active.
pub const PROGRESS_TICK_MS: u64 = 10_000;

/// CPU-bound loops yield once they have run longer than this.
pub const YIELD_THRESHOLD_MS: u64 = 1_000;

/// Candle timeframe used for historical USD prices.
pub const PRICE_CANDLE_TIMEFRAME: &str = "1D";

/// Fiat currencies that are summed as currency before conversion.
pub const DEFAULT_FOREX_SYMBOLS: &[&str] = &["USD", "EUR", "GBP", "JPY", "CNH", "CHF"];

pub const USD: &str = "USD";
