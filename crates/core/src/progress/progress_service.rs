use log::{debug, error};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use super::{
    EtaEstimator, ProgressInput, ProgressRepositoryTrait, ProgressSnapshot, ProgressState,
    StoredProgress,
};
use crate::errors::Result;
use crate::messaging::{ProcessMessage, ProcessMessageSender, ReadySyncPayload};
use crate::utils::time_utils::now_ms;

#[derive(Debug, Default)]
struct ProgressRuntime {
    started_at: Option<i64>,
    last: StoredProgress,
    has_changed: bool,
    estimator: EtaEstimator,
}

impl ProgressRuntime {
    fn snapshot(&mut self, stored: StoredProgress, now: i64) -> ProgressSnapshot {
        let Some(started_at) = self.started_at else {
            return ProgressSnapshot {
                value: stored.value,
                error: stored.error,
                state: stored.state,
                ..ProgressSnapshot::default()
            };
        };

        let spent = (now - started_at).max(0);
        let left = if stored.state == Some(ProgressState::Active) {
            let changed = std::mem::take(&mut self.has_changed);
            self.estimator.estimate(now, spent, stored.value, changed)
        } else {
            None
        };

        ProgressSnapshot {
            value: stored.value,
            error: stored.error,
            state: stored.state,
            sync_started_at: Some(started_at),
            spent_time: Some(spent),
            left_time: left,
        }
    }
}

/// Publishes sync progress to local listeners and the host process.
///
/// Errors raised while persisting or estimating are logged, never returned
/// to the reporting caller.
pub struct ProgressService {
    repository: Arc<dyn ProgressRepositoryTrait>,
    messenger: Arc<dyn ProcessMessageSender>,
    listeners: broadcast::Sender<ProgressSnapshot>,
    runtime: Arc<Mutex<ProgressRuntime>>,
    tick: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressService {
    pub fn new(
        repository: Arc<dyn ProgressRepositoryTrait>,
        messenger: Arc<dyn ProcessMessageSender>,
        tick: Duration,
    ) -> Self {
        let (listeners, _) = broadcast::channel(64);
        Self {
            repository,
            messenger,
            listeners,
            runtime: Arc::new(Mutex::new(ProgressRuntime::default())),
            tick,
            ticker: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.listeners.subscribe()
    }

    pub async fn set_progress(&self, input: impl Into<ProgressInput>) {
        let stored = StoredProgress::classify(input.into());

        if let Err(e) = self.repository.save(stored.clone()).await {
            error!("Failed to persist sync progress: {}", e);
        }

        let snapshot = {
            let mut runtime = lock(&self.runtime);
            if runtime.last.value != stored.value {
                runtime.has_changed = true;
            }
            runtime.last = stored.clone();
            runtime.snapshot(stored.clone(), now_ms())
        };
        let _ = self.listeners.send(snapshot);

        match stored.state {
            Some(ProgressState::Error) => {
                self.messenger.send(
                    ProcessMessage::ErrorSync,
                    Some(json!({ "error": stored.error })),
                );
            }
            Some(state @ (ProgressState::Finished | ProgressState::Interrupted)) => {
                let payload = ReadySyncPayload {
                    is_finished: state == ProgressState::Finished,
                    is_interrupted: state == ProgressState::Interrupted,
                };
                self.messenger
                    .send(ProcessMessage::ReadySync, serde_json::to_value(payload).ok());
            }
            _ => {}
        }
    }

    pub fn set_sub_phase_left_time(&self, left_time: Option<i64>) {
        lock(&self.runtime)
            .estimator
            .set_sub_phase_left_time(left_time);
    }

    pub fn get_progress(&self) -> Result<ProgressSnapshot> {
        let stored = self.repository.load()?;
        Ok(lock(&self.runtime).snapshot(stored, now_ms()))
    }

    /// The persisted triple without timing fields.
    pub fn get_non_estimated_progress(&self) -> Result<StoredProgress> {
        self.repository.load()
    }

    pub fn is_sync_in_progress(&self) -> Result<bool> {
        Ok(self.repository.load()?.is_sync_in_progress())
    }

    pub fn is_active(&self) -> bool {
        lock(&self.runtime).started_at.is_some()
    }

    /// Records the run start and begins the periodic emission tick.
    /// Must be called from within a Tokio runtime.
    pub fn activate(&self) {
        {
            let mut runtime = lock(&self.runtime);
            runtime.started_at = Some(now_ms());
            runtime.has_changed = true;
            runtime.estimator.reset();
        }

        let runtime = Arc::clone(&self.runtime);
        let listeners = self.listeners.clone();
        let period = self.tick;
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                let snapshot = {
                    let mut runtime = lock(&runtime);
                    if runtime.started_at.is_none() {
                        break;
                    }
                    let last = runtime.last.clone();
                    runtime.snapshot(last, now_ms())
                };
                debug!("Progress tick: {:?}", snapshot.left_time);
                let _ = listeners.send(snapshot);
            }
        });

        if let Some(previous) = lock(&self.ticker).replace(handle) {
            previous.abort();
        }
    }

    /// Stops the tick and forgets the run start.
    pub fn deactivate(&self) {
        if let Some(handle) = lock(&self.ticker).take() {
            handle.abort();
        }
        let mut runtime = lock(&self.runtime);
        runtime.started_at = None;
        runtime.estimator.reset();
    }
}

impl Drop for ProgressService {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.ticker).take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
