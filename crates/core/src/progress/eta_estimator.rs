/// Linear time-remaining estimate: `floor(spent / progress * (100 - progress))`.
pub fn linear_left_time(spent_ms: i64, progress: f64) -> Option<i64> {
    if !progress.is_finite() || progress <= 0.0 || spent_ms < 0 {
        return None;
    }
    if progress >= 100.0 {
        return Some(0);
    }
    Some((spent_ms as f64 / progress * (100.0 - progress)).floor() as i64)
}

/// Time-remaining estimator shared by the progress tick and readers.
///
/// A changed progress value re-estimates linearly. An unchanged one decays
/// the previous estimate by wall-clock time, never dropping below the
/// sub-phase estimate supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct EtaEstimator {
    left_time: Option<i64>,
    prev_estimated_at: Option<i64>,
    sub_phase_left_time: Option<i64>,
}

impl EtaEstimator {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_sub_phase_left_time(&mut self, left_time: Option<i64>) {
        self.sub_phase_left_time = left_time;
    }

    pub fn estimate(
        &mut self,
        now: i64,
        spent_ms: i64,
        progress: Option<f64>,
        has_changed: bool,
    ) -> Option<i64> {
        let Some(progress) = progress.filter(|p| p.is_finite() && *p > 0.0) else {
            self.prev_estimated_at = Some(now);
            self.left_time = None;
            return None;
        };

        let next = match self.left_time {
            Some(prev_left) if !has_changed => {
                let elapsed = now - self.prev_estimated_at.unwrap_or(now);
                let decayed = prev_left - elapsed;
                if decayed > 0 {
                    Some(self.sub_phase_left_time.map_or(decayed, |f| decayed.max(f)))
                } else {
                    self.sub_phase_left_time
                        .or_else(|| linear_left_time(spent_ms, progress))
                }
            }
            _ => linear_left_time(spent_ms, progress),
        };

        self.prev_estimated_at = Some(now);
        self.left_time = next;
        next
    }
}
