use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    /// A master user whose history is assembled from linked sub-users.
    pub is_sub_account: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub is_sub_account: bool,
}

/// Master user id to the ids of its sub-users.
pub type SubAccountMap = HashMap<i64, Vec<i64>>;

/// User lookups. Credentials are held elsewhere.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>>;

    fn get_users(&self) -> Result<Vec<UserRecord>>;

    fn get_sub_account_map(&self) -> Result<SubAccountMap>;

    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord>;

    async fn link_sub_user(&self, master_user_id: i64, sub_user_id: i64) -> Result<()>;
}
