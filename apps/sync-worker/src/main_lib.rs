use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use ledgersync_core::{
    conversion::CurrencyConversionBackfill,
    ledgers::SubAccountRecalcService,
    messaging::{ChannelMessageSender, MessageEnvelope, ProcessMessageManager},
    progress::ProgressService,
    settings::SyncSettings,
    sync::{StagingRepositoryTrait, SyncQueueService, SyncStepTracker},
    tax::TaxReportService,
    timeframe::BalanceHistoryService,
    users::Authenticator,
};
use ledgersync_storage_sqlite::{
    collections::ensure_collection_tables,
    conversion::{CandleRepository, ConversionRepository},
    db::{self, write_actor},
    ledgers::LedgerRepository,
    maintenance::MaintenanceRepository,
    progress::ProgressRepository,
    sync::{StagingRepository, SyncQueueRepository, SyncUserStepRepository},
    tax::TaxEventRepository,
    users::UserRepository,
};

pub struct AppState {
    pub db_path: String,
    pub settings: SyncSettings,
    pub authenticator: Arc<dyn Authenticator>,
    pub staging: Arc<dyn StagingRepositoryTrait>,
    pub queue_service: Arc<SyncQueueService>,
    pub step_tracker: Arc<SyncStepTracker>,
    pub progress_service: Arc<ProgressService>,
    pub conversion_backfill: Arc<CurrencyConversionBackfill>,
    pub sub_account_recalc: Arc<SubAccountRecalcService>,
    pub tax_report_service: Arc<TaxReportService>,
    pub balance_history_service: Arc<BalanceHistoryService>,
    pub process_messages: Arc<ProcessMessageManager>,
}

pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr, stdout carries the host channel.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Opens the database and wires every service. Returns the state and the
/// queue of envelopes bound for the host.
pub async fn build_state(
    config: &Config,
) -> anyhow::Result<(Arc<AppState>, UnboundedReceiver<MessageEnvelope>)> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    {
        let mut conn = db::get_connection(&pool)?;
        ensure_collection_tables(&mut conn)?;
    }
    let writer = write_actor::spawn_writer((*pool).clone());
    let settings = SyncSettings::default();

    let (message_sender, outgoing) = ChannelMessageSender::new();
    let message_sender = Arc::new(message_sender);

    let queue_repository = Arc::new(SyncQueueRepository::new(pool.clone(), writer.clone()));
    let queue_service = Arc::new(SyncQueueService::new(queue_repository));

    let staging: Arc<dyn StagingRepositoryTrait> =
        Arc::new(StagingRepository::new(pool.clone(), writer.clone()));
    let swept = staging.sweep_orphans()?;
    if !swept.is_empty() {
        tracing::info!("Dropped {} orphaned staging tables", swept.len());
    }

    let step_repository = Arc::new(SyncUserStepRepository::new(pool.clone(), writer.clone()));
    let step_tracker = Arc::new(SyncStepTracker::new(step_repository));

    let progress_repository = Arc::new(ProgressRepository::new(pool.clone(), writer.clone()));
    let progress_service = Arc::new(ProgressService::new(
        progress_repository,
        message_sender.clone(),
        settings.progress_tick(),
    ));

    let authenticator: Arc<dyn Authenticator> =
        Arc::new(UserRepository::new(pool.clone(), writer.clone()));
    let candles = Arc::new(CandleRepository::new(pool.clone()));
    let ledgers = Arc::new(LedgerRepository::new(pool.clone(), writer.clone()));

    let conversion_backfill = Arc::new(CurrencyConversionBackfill::new(
        Arc::new(ConversionRepository::new(pool.clone(), writer.clone())),
        candles.clone(),
        settings.clone(),
    ));
    let sub_account_recalc = Arc::new(SubAccountRecalcService::new(
        ledgers.clone(),
        authenticator.clone(),
        settings.clone(),
    ));
    let tax_report_service = Arc::new(TaxReportService::new(
        Arc::new(TaxEventRepository::new(pool.clone())),
        candles.clone(),
        settings.clone(),
    ));
    let balance_history_service = Arc::new(BalanceHistoryService::new(
        ledgers,
        candles,
        settings.clone(),
    ));

    let maintenance = Arc::new(MaintenanceRepository::new(
        pool.clone(),
        writer,
        db_path.clone(),
        config.backup_dir.clone(),
    ));
    let process_messages = Arc::new(ProcessMessageManager::new(maintenance, message_sender));

    let state = Arc::new(AppState {
        db_path,
        settings,
        authenticator,
        staging,
        queue_service,
        step_tracker,
        progress_service,
        conversion_backfill,
        sub_account_recalc,
        tax_report_service,
        balance_history_service,
        process_messages,
    });

    Ok((state, outgoing))
}
