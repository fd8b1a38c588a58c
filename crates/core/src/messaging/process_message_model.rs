use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// States the host can send to the sync unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    ClearAllTables,
    RemoveAllTables,
    BackupDb,
    RestoreDb,
    RequestGetBackupFilesMetadata,
}

impl ProcessState {
    /// Parses a wire state; unknown names yield `None`.
    pub fn parse(state: &str) -> Option<Self> {
        serde_json::from_value(Value::String(state.to_string())).ok()
    }
}

/// Messages the sync unit sends to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessMessage {
    #[serde(rename = "ALL_TABLE_HAVE_BEEN_CLEARED")]
    AllTablesHaveBeenCleared,
    #[serde(rename = "ALL_TABLE_HAVE_NOT_BEEN_CLEARED")]
    AllTablesHaveNotBeenCleared,
    #[serde(rename = "ALL_TABLE_HAVE_BEEN_REMOVED")]
    AllTablesHaveBeenRemoved,
    #[serde(rename = "ALL_TABLE_HAVE_NOT_BEEN_REMOVED")]
    AllTablesHaveNotBeenRemoved,
    BackupFinished,
    ErrorBackup,
    DbHasBeenRestored,
    DbHasNotBeenRestored,
    ResponseGetBackupFilesMetadata,
    ReadySync,
    ErrorSync,
}

/// Wire envelope `{state, data}` with an optional error set by the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageEnvelope {
    pub fn outgoing(message: ProcessMessage, data: Option<Value>) -> Self {
        let state = match serde_json::to_value(message) {
            Ok(Value::String(s)) => s,
            _ => format!("{message:?}"),
        };
        Self {
            state,
            data,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFileMetadata {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Payload of READY_SYNC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadySyncPayload {
    pub is_finished: bool,
    pub is_interrupted: bool,
}
