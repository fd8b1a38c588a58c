use super::*;
use crate::errors::{DatabaseError, Error};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct FakeMaintenance {
    fail: bool,
    cleared: AtomicUsize,
}

#[async_trait]
impl MaintenanceHandler for FakeMaintenance {
    async fn clear_all_tables(&self) -> crate::Result<()> {
        if self.fail {
            return Err(Error::Database(DatabaseError::QueryFailed("locked".into())));
        }
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_all_tables(&self) -> crate::Result<()> {
        Ok(())
    }

    async fn backup_db(&self) -> crate::Result<String> {
        Ok("/backups/db_1.db".to_string())
    }

    async fn restore_db(&self, backup_name: Option<String>) -> crate::Result<()> {
        match backup_name {
            Some(_) => Ok(()),
            None => Err(Error::BadRequest("backup name is required".into())),
        }
    }

    async fn backup_files_metadata(&self) -> crate::Result<Vec<BackupFileMetadata>> {
        Ok(vec![BackupFileMetadata {
            name: "db_1.db".into(),
            path: "/backups/db_1.db".into(),
            size: 42,
            modified_at: None,
        }])
    }
}

fn manager(fail: bool) -> (ProcessMessageManager, MockMessageSender, Arc<FakeMaintenance>) {
    let sender = MockMessageSender::new();
    let handler = Arc::new(FakeMaintenance {
        fail,
        ..FakeMaintenance::default()
    });
    let manager = ProcessMessageManager::new(handler.clone(), Arc::new(sender.clone()));
    (manager, sender, handler)
}

fn envelope(state: &str, data: Option<serde_json::Value>) -> MessageEnvelope {
    MessageEnvelope {
        state: state.to_string(),
        data,
        error: None,
    }
}

#[test]
fn test_wire_names_match_contract() {
    assert_eq!(
        ProcessState::parse("REQUEST_GET_BACKUP_FILES_METADATA"),
        Some(ProcessState::RequestGetBackupFilesMetadata)
    );
    assert_eq!(ProcessState::parse("SOMETHING_ELSE"), None);

    let env = MessageEnvelope::outgoing(ProcessMessage::AllTablesHaveBeenCleared, None);
    assert_eq!(env.state, "ALL_TABLE_HAVE_BEEN_CLEARED");
    let env = MessageEnvelope::outgoing(ProcessMessage::ReadySync, None);
    assert_eq!(
        serde_json::to_value(&env).unwrap(),
        json!({ "state": "READY_SYNC" })
    );
}

#[tokio::test]
async fn test_clear_all_tables_reports_success_and_resolves_waiter() {
    let (manager, sender, handler) = manager(false);
    let rx = manager.wait_for(ProcessState::ClearAllTables).unwrap();

    manager
        .process(envelope("CLEAR_ALL_TABLES", Some(json!({ "by": "host" }))))
        .await;

    assert_eq!(handler.cleared.load(Ordering::SeqCst), 1);
    assert_eq!(
        sender.messages(),
        vec![ProcessMessage::AllTablesHaveBeenCleared]
    );
    assert_eq!(rx.await.unwrap(), Ok(Some(json!({ "by": "host" }))));
}

#[tokio::test]
async fn test_handler_failure_sends_negative_message_and_rejects() {
    let (manager, sender, _) = manager(true);
    let rx = manager.wait_for(ProcessState::ClearAllTables).unwrap();

    manager.process(envelope("CLEAR_ALL_TABLES", None)).await;

    assert_eq!(
        sender.messages(),
        vec![ProcessMessage::AllTablesHaveNotBeenCleared]
    );
    assert!(rx.await.unwrap().is_err());
}

#[tokio::test]
async fn test_host_error_skips_handler() {
    let (manager, sender, handler) = manager(false);
    manager
        .process(MessageEnvelope {
            state: "CLEAR_ALL_TABLES".into(),
            data: None,
            error: Some("cancelled".into()),
        })
        .await;

    assert_eq!(handler.cleared.load(Ordering::SeqCst), 0);
    assert_eq!(
        sender.messages(),
        vec![ProcessMessage::AllTablesHaveNotBeenCleared]
    );
}

#[tokio::test]
async fn test_unknown_state_is_dropped() {
    let (manager, sender, _) = manager(false);
    manager.process(envelope("DROP_EVERYTHING", None)).await;
    assert!(sender.sent().is_empty());
}

#[tokio::test]
async fn test_only_one_waiter_per_state() {
    let (manager, _, _) = manager(false);
    let _rx = manager.wait_for(ProcessState::BackupDb).unwrap();
    assert!(manager.wait_for(ProcessState::BackupDb).is_err());
    assert!(manager.wait_for(ProcessState::RestoreDb).is_ok());
}

#[tokio::test]
async fn test_restore_and_metadata_responses() {
    let (manager, sender, _) = manager(false);

    manager.process(envelope("RESTORE_DB", None)).await;
    manager
        .process(envelope("RESTORE_DB", Some(json!({ "name": "db_1.db" }))))
        .await;
    manager
        .process(envelope("REQUEST_GET_BACKUP_FILES_METADATA", None))
        .await;

    let sent = sender.sent();
    assert_eq!(sent[0].0, ProcessMessage::DbHasNotBeenRestored);
    assert_eq!(sent[1].0, ProcessMessage::DbHasBeenRestored);
    assert_eq!(sent[2].0, ProcessMessage::ResponseGetBackupFilesMetadata);
    let payload = sent[2].1.clone().unwrap();
    assert_eq!(payload["backupFilesMetadata"][0]["size"], json!(42));
}
