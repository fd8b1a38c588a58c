use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts epoch milliseconds into a UTC instant, `None` when out of range.
pub fn datetime_from_ms(mts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(mts)
}

/// Yields back to the runtime once a loop has been running longer than the
/// configured threshold.
///
/// CPU-bound loops over large histories call [`CooperativeYield::tick`] once per
/// item; the call is free until the threshold elapses.
#[derive(Debug)]
pub struct CooperativeYield {
    threshold: Duration,
    last_yield: Instant,
}

impl CooperativeYield {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_yield: Instant::now(),
        }
    }

    /// Returns true when it yielded.
    pub async fn tick(&mut self) -> bool {
        if self.last_yield.elapsed() <= self.threshold {
            return false;
        }
        tokio::task::yield_now().await;
        self.last_yield = Instant::now();
        true
    }
}
