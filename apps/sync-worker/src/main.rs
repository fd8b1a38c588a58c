use ledgersync_sync_worker::config::{log_format_from_env, Config};
use ledgersync_sync_worker::{build_state, init_tracing, ipc, scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&log_format_from_env());
    let config = Config::from_env();
    let (state, outgoing) = build_state(&config).await?;

    // Periodic currency conversion and sub-account recalculation
    scheduler::start_maintenance_scheduler(state.clone(), config.backfill_interval);

    tracing::info!("Sync worker ready, reading host messages from stdin");
    ipc::serve_stdio(state, outgoing).await?;
    tracing::info!("Host channel closed, shutting down");
    Ok(())
}
