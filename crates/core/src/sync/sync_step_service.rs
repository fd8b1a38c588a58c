use log::debug;
use std::sync::Arc;

use super::{
    reconcile_last_synced, LastSyncedInfo, SyncPartition, SyncUserStep,
    SyncUserStepRepositoryTrait,
};
use crate::collections::Collection;
use crate::errors::Result;

/// Tells the orchestrator which windows of a partition remain unsynced.
pub struct SyncStepTracker {
    repository: Arc<dyn SyncUserStepRepositoryTrait>,
}

impl SyncStepTracker {
    pub fn new(repository: Arc<dyn SyncUserStepRepositoryTrait>) -> Self {
        Self { repository }
    }

    pub fn get_last_synced_info(
        &self,
        partition: &SyncPartition,
        run_id: Option<i64>,
    ) -> Result<LastSyncedInfo> {
        let record = self.repository.get_step(partition)?;
        let bounds = self.repository.get_observed_bounds(partition, run_id)?;
        let info = reconcile_last_synced(partition.collection.schema(), record.as_ref(), &bounds)?;
        debug!(
            "Last synced info for {} (user {:?}): {:?}",
            partition.collection, partition.user_id, info
        );
        Ok(info)
    }

    pub async fn record_progress(&self, partition: SyncPartition, step: SyncUserStep) -> Result<()> {
        self.repository.upsert_step(partition, step).await
    }

    pub fn is_ready(&self, partition: &SyncPartition) -> Result<bool> {
        Ok(self
            .repository
            .get_step(partition)?
            .is_some_and(|step| step.is_ready()))
    }

    /// True when every collection finished its base window for the user once.
    pub fn have_collections_been_synced_at_least_once(
        &self,
        user_id: i64,
        collections: &[Collection],
    ) -> Result<bool> {
        let steps = self.repository.get_steps_for_user(user_id)?;
        Ok(collections.iter().all(|collection| {
            steps
                .iter()
                .any(|(p, step)| p.collection == *collection && step.is_base_ready())
        }))
    }

    pub async fn delete_for_user(&self, user_id: i64) -> Result<usize> {
        self.repository.delete_for_user(user_id).await
    }
}
