use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::{LockOutcome, SyncQueueJob, SyncQueueRepositoryTrait, SyncQueueState};
use crate::collections::Collection;
use crate::errors::{Result, SyncError, ValidationError};

/// Answer to a run request.
#[derive(Debug)]
pub enum RunTicket {
    /// The caller owns the run.
    Started(SyncQueueJob),
    /// Another run of the same owner is LOCKED; resolves with its final state.
    Waiting {
        running_job_id: i64,
        done: oneshot::Receiver<SyncQueueState>,
    },
    Rejected { running_job_id: i64 },
}

/// Serializes sync runs per owner.
///
/// A run stops between steps by flipping its job out of LOCKED; the step
/// loop polls [`SyncQueueService::is_run_active`].
pub struct SyncQueueService {
    repository: Arc<dyn SyncQueueRepositoryTrait>,
    /// Waiters keyed by the LOCKED job they wait on.
    waiters: Mutex<HashMap<i64, Vec<oneshot::Sender<SyncQueueState>>>>,
}

impl SyncQueueService {
    pub fn new(repository: Arc<dyn SyncQueueRepositoryTrait>) -> Self {
        Self {
            repository,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Requests a run. With `wait` a concurrent request gets a future on the
    /// running job instead of a rejection.
    pub async fn request_run(
        &self,
        owner_user_id: Option<i64>,
        collections: Vec<Collection>,
        wait: bool,
    ) -> Result<RunTicket> {
        if let Some(running) = self.repository.get_locked_for_owner(owner_user_id)? {
            return self.busy(running, wait);
        }

        let job = self.repository.create(owner_user_id, collections).await?;
        match self.repository.try_lock(job.id).await? {
            LockOutcome::Locked(job) => {
                info!("Sync run {} started for owner {:?}", job.id, owner_user_id);
                Ok(RunTicket::Started(job))
            }
            LockOutcome::Busy(running) => {
                self.repository.delete_new(job.id).await?;
                debug!(
                    "Dropped sync job {}, owner {:?} is running job {}",
                    job.id, owner_user_id, running.id
                );
                self.busy(running, wait)
            }
        }
    }

    fn busy(&self, running: SyncQueueJob, wait: bool) -> Result<RunTicket> {
        if !wait {
            return Ok(RunTicket::Rejected {
                running_job_id: running.id,
            });
        }
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(running.id)
            .or_default()
            .push(tx);

        // The run may have finished before the waiter was registered.
        let current = self.repository.get(running.id)?.map(|job| job.state);
        if current != Some(SyncQueueState::Locked) {
            self.notify(running.id, current.unwrap_or(SyncQueueState::Done));
        }

        Ok(RunTicket::Waiting {
            running_job_id: running.id,
            done: rx,
        })
    }

    /// Records the final state of a run and releases its waiters.
    pub async fn finish_run(&self, job_id: i64, outcome: SyncQueueState) -> Result<SyncQueueJob> {
        if !matches!(outcome, SyncQueueState::Done | SyncQueueState::Error) {
            return Err(ValidationError::InvalidInput(format!(
                "a run cannot finish as {outcome}"
            ))
            .into());
        }
        let job = self.repository.update_state(job_id, outcome).await?;
        info!("Sync run {} finished as {}", job.id, outcome);
        self.notify(job.id, outcome);
        Ok(job)
    }

    /// Flips the owner's LOCKED job back to NEW. Returns false when nothing
    /// was running.
    pub async fn interrupt(&self, owner_user_id: Option<i64>) -> Result<bool> {
        let Some(running) = self.repository.get_locked_for_owner(owner_user_id)? else {
            return Ok(false);
        };
        self.repository
            .update_state(running.id, SyncQueueState::New)
            .await?;
        warn!("Sync run {} interrupted", running.id);
        self.notify(running.id, SyncQueueState::New);
        Ok(true)
    }

    pub fn is_run_active(&self, job_id: i64) -> Result<bool> {
        let job = self
            .repository
            .get(job_id)?
            .ok_or(SyncError::JobNotFound(job_id))?;
        Ok(job.state == SyncQueueState::Locked)
    }

    /// Fails with [`SyncError::Interrupted`] once the job left LOCKED.
    pub fn ensure_run_active(&self, job_id: i64) -> Result<()> {
        if self.is_run_active(job_id)? {
            Ok(())
        } else {
            Err(SyncError::Interrupted.into())
        }
    }

    fn notify(&self, job_id: i64, state: SyncQueueState) {
        let pending = self
            .waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&job_id)
            .unwrap_or_default();
        for tx in pending {
            let _ = tx.send(state);
        }
    }
}
