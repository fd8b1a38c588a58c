//! Background scheduler for the post-sync maintenance passes.
//!
//! Prices rows that an earlier pass could not convert yet and recalculates
//! sub-account balances on the main tables.

use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::main_lib::AppState;
use ledgersync_core::conversion::BackfillSummary;

/// Initial delay before the first pass, to let the host connect.
const INITIAL_DELAY_SECS: u64 = 30;

#[derive(Debug, Default)]
pub struct MaintenancePass {
    pub conversion: BackfillSummary,
    pub recalculated: usize,
    pub skipped: bool,
}

pub fn start_maintenance_scheduler(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        info!("Maintenance scheduler started ({}s interval)", every.as_secs());
        tokio::time::sleep(Duration::from_secs(INITIAL_DELAY_SECS)).await;

        let mut ticks = interval(every);
        loop {
            ticks.tick().await;
            run_maintenance_pass(&state).await;
        }
    });
}

/// Runs conversion then recalculation once. Skipped while a sync run owns
/// the tables.
pub async fn run_maintenance_pass(state: &AppState) -> MaintenancePass {
    match state.progress_service.is_sync_in_progress() {
        Ok(true) => {
            debug!("Maintenance pass skipped: sync in progress");
            return MaintenancePass {
                skipped: true,
                ..MaintenancePass::default()
            };
        }
        Ok(false) => {}
        Err(e) => warn!("Could not read sync progress: {}", e),
    }

    let conversion = state.conversion_backfill.execute(None, &[]).await;
    for (collection, error) in &conversion.failed {
        warn!("Currency conversion of {:?} failed: {}", collection, error);
    }

    let recalculated = match state.sub_account_recalc.execute(None).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Sub-account recalculation failed: {}", e);
            0
        }
    };

    info!(
        "Maintenance pass done: {} rows converted, {} unresolved, {} recalculated",
        conversion.total_converted(),
        conversion.unresolved,
        recalculated
    );
    MaintenancePass {
        conversion,
        recalculated,
        skipped: false,
    }
}
