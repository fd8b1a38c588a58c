use async_trait::async_trait;
use log::{debug, error, info};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::{
    BackupFileMetadata, MessageEnvelope, ProcessMessage, ProcessMessageSender, ProcessState,
};
use crate::errors::{Result, SyncError};

/// Database maintenance the host can request over the channel.
#[async_trait]
pub trait MaintenanceHandler: Send + Sync {
    /// Deletes the rows of every table except users and sub-accounts.
    async fn clear_all_tables(&self) -> Result<()>;

    /// Drops every table with foreign keys disabled, re-enabling them after,
    /// and recreates the empty schema.
    async fn remove_all_tables(&self) -> Result<()>;

    /// Returns the path of the created backup.
    async fn backup_db(&self) -> Result<String>;

    async fn restore_db(&self, backup_name: Option<String>) -> Result<()>;

    async fn backup_files_metadata(&self) -> Result<Vec<BackupFileMetadata>>;
}

type Waiter = oneshot::Sender<std::result::Result<Option<Value>, String>>;

/// Dispatches incoming host states and resolves correlated waiters.
pub struct ProcessMessageManager {
    handler: Arc<dyn MaintenanceHandler>,
    sender: Arc<dyn ProcessMessageSender>,
    waiters: Mutex<HashMap<ProcessState, Waiter>>,
}

impl ProcessMessageManager {
    pub fn new(handler: Arc<dyn MaintenanceHandler>, sender: Arc<dyn ProcessMessageSender>) -> Self {
        Self {
            handler,
            sender,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn send_state(&self, message: ProcessMessage, data: Option<Value>) -> bool {
        let sent = self.sender.send(message, data);
        if !sent {
            error!("Process message {:?} could not be sent", message);
        }
        sent
    }

    /// Registers the single waiter for `state`. It resolves with the
    /// envelope data once the state has been handled, or rejects with the
    /// error text.
    pub fn wait_for(
        &self,
        state: ProcessState,
    ) -> Result<oneshot::Receiver<std::result::Result<Option<Value>, String>>> {
        let mut waiters = self
            .waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if waiters.get(&state).is_some_and(|w| !w.is_closed()) {
            return Err(SyncError::WaiterAlreadyPending(format!("{state:?}")).into());
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(state, tx);
        Ok(rx)
    }

    /// Handles one incoming envelope. Unknown states are dropped.
    pub async fn process(&self, envelope: MessageEnvelope) {
        let Some(state) = ProcessState::parse(&envelope.state) else {
            debug!("Dropping unknown process state '{}'", envelope.state);
            return;
        };

        let outcome = match envelope.error {
            Some(err) => {
                error!("Host reported an error for {:?}: {}", state, err);
                self.report_failure(state, &err);
                Err(err)
            }
            None => match self.dispatch(state, envelope.data.clone()).await {
                Ok(()) => Ok(envelope.data),
                Err(e) => {
                    error!("Handling {:?} failed: {}", state, e);
                    self.report_failure(state, &e.to_string());
                    Err(e.to_string())
                }
            },
        };

        self.resolve(state, outcome);
    }

    async fn dispatch(&self, state: ProcessState, data: Option<Value>) -> Result<()> {
        match state {
            ProcessState::ClearAllTables => {
                self.handler.clear_all_tables().await?;
                self.send_state(ProcessMessage::AllTablesHaveBeenCleared, None);
            }
            ProcessState::RemoveAllTables => {
                self.handler.remove_all_tables().await?;
                debug!("All tables have been removed");
                self.send_state(ProcessMessage::AllTablesHaveBeenRemoved, None);
            }
            ProcessState::BackupDb => {
                let path = self.handler.backup_db().await?;
                info!("Database backed up to {}", path);
                self.send_state(ProcessMessage::BackupFinished, Some(json!({ "path": path })));
            }
            ProcessState::RestoreDb => {
                let name = data
                    .as_ref()
                    .and_then(|d| d.get("name").or_else(|| d.get("backupName")))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.handler.restore_db(name).await?;
                self.send_state(ProcessMessage::DbHasBeenRestored, None);
            }
            ProcessState::RequestGetBackupFilesMetadata => {
                let metadata = self.handler.backup_files_metadata().await?;
                self.send_state(
                    ProcessMessage::ResponseGetBackupFilesMetadata,
                    Some(json!({ "backupFilesMetadata": metadata })),
                );
            }
        }
        Ok(())
    }

    fn report_failure(&self, state: ProcessState, err: &str) {
        match state {
            ProcessState::ClearAllTables => {
                self.send_state(ProcessMessage::AllTablesHaveNotBeenCleared, None);
            }
            ProcessState::RemoveAllTables => {
                self.send_state(ProcessMessage::AllTablesHaveNotBeenRemoved, None);
            }
            ProcessState::BackupDb => {
                self.send_state(ProcessMessage::ErrorBackup, None);
            }
            ProcessState::RestoreDb => {
                self.send_state(ProcessMessage::DbHasNotBeenRestored, None);
            }
            ProcessState::RequestGetBackupFilesMetadata => {
                self.send_state(
                    ProcessMessage::ResponseGetBackupFilesMetadata,
                    Some(json!({ "err": err })),
                );
            }
        }
    }

    fn resolve(&self, state: ProcessState, outcome: std::result::Result<Option<Value>, String>) {
        let waiter = self
            .waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&state);
        if let Some(tx) = waiter {
            let _ = tx.send(outcome);
        }
    }
}
