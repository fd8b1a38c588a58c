//! Tunables shared by the sync engine and report services.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    CONVERSION_BATCH_SIZE, DEFAULT_FOREX_SYMBOLS, MAX_BATCHES_PER_COLLECTION, PROGRESS_TICK_MS,
    RECALC_BATCH_SIZE, YIELD_THRESHOLD_MS,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Currencies summed as currency before USD conversion.
    pub forex_symbols: Vec<String>,
    pub conversion_batch_size: i64,
    pub max_batches_per_collection: usize,
    pub recalc_batch_size: i64,
    pub progress_tick_ms: u64,
    pub yield_threshold_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            forex_symbols: DEFAULT_FOREX_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            conversion_batch_size: CONVERSION_BATCH_SIZE,
            max_batches_per_collection: MAX_BATCHES_PER_COLLECTION,
            recalc_batch_size: RECALC_BATCH_SIZE,
            progress_tick_ms: PROGRESS_TICK_MS,
            yield_threshold_ms: YIELD_THRESHOLD_MS,
        }
    }
}

impl SyncSettings {
    pub fn is_forex(&self, currency: &str) -> bool {
        self.forex_symbols
            .iter()
            .any(|s| s.eq_ignore_ascii_case(currency))
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }

    pub fn yield_threshold(&self) -> Duration {
        Duration::from_millis(self.yield_threshold_ms)
    }
}
