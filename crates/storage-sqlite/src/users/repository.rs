use async_trait::async_trait;
use diesel::prelude::*;
use log::info;
use std::sync::Arc;

use super::model::{NewUserDB, SubAccountDB, UserDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{sub_accounts, users};
use ledgersync_core::errors::{Result, ValidationError};
use ledgersync_core::users::{Authenticator, NewUser, SubAccountMap, UserRecord};

pub struct UserRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl UserRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl Authenticator for UserRepository {
    fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let user = users::table
            .find(user_id)
            .select(UserDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(user.map(UserRecord::from))
    }

    fn get_users(&self) -> Result<Vec<UserRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let all = users::table
            .order(users::_id.asc())
            .select(UserDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?;
        Ok(all.into_iter().map(UserRecord::from).collect())
    }

    fn get_sub_account_map(&self) -> Result<SubAccountMap> {
        let mut conn = get_connection(&self.pool)?;
        let links = sub_accounts::table
            .order((sub_accounts::master_user_id.asc(), sub_accounts::sub_user_id.asc()))
            .load::<SubAccountDB>(&mut conn)
            .map_err(StorageError::from)?;

        let mut map = SubAccountMap::new();
        for link in links {
            map.entry(link.master_user_id)
                .or_default()
                .push(link.sub_user_id);
        }
        Ok(map)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord> {
        let row = NewUserDB::from(new_user);
        self.writer
            .exec(move |conn| {
                let created = diesel::insert_into(users::table)
                    .values(&row)
                    .returning(UserDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                Ok(UserRecord::from(created))
            })
            .await
    }

    async fn link_sub_user(&self, master_user_id: i64, sub_user_id: i64) -> Result<()> {
        if master_user_id == sub_user_id {
            return Err(ValidationError::InvalidInput(format!(
                "user {} cannot be its own sub-user",
                master_user_id
            ))
            .into());
        }

        self.writer
            .exec(move |conn| {
                let master = users::table
                    .find(master_user_id)
                    .select(UserDB::as_select())
                    .first(conn)
                    .map_err(StorageError::from)?;
                if !master.is_sub_account {
                    return Err(ValidationError::InvalidInput(format!(
                        "user {} is not a sub-account master",
                        master_user_id
                    ))
                    .into());
                }

                diesel::insert_or_ignore_into(sub_accounts::table)
                    .values(&SubAccountDB {
                        master_user_id,
                        sub_user_id,
                    })
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;

        info!("Linked sub-user {} to user {}", sub_user_id, master_user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;

    fn new_user(email: &str, is_sub_account: bool) -> NewUser {
        NewUser {
            email: email.to_string(),
            is_sub_account,
        }
    }

    #[tokio::test]
    async fn test_sub_account_map_groups_by_master() {
        let db = setup_db();
        let repo = UserRepository::new(db.pool.clone(), db.writer.clone());

        let master = repo.create_user(new_user("master@example.com", true)).await.unwrap();
        let a = repo.create_user(new_user("a@example.com", false)).await.unwrap();
        let b = repo.create_user(new_user("b@example.com", false)).await.unwrap();

        repo.link_sub_user(master.id, b.id).await.unwrap();
        repo.link_sub_user(master.id, a.id).await.unwrap();
        repo.link_sub_user(master.id, a.id).await.unwrap();

        let map = repo.get_sub_account_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&master.id], vec![a.id, b.id]);
        assert_eq!(repo.get_users().unwrap().len(), 3);
        assert_eq!(repo.get_user(a.id).unwrap().unwrap().email, "a@example.com");
    }

    #[tokio::test]
    async fn test_link_requires_sub_account_master() {
        let db = setup_db();
        let repo = UserRepository::new(db.pool.clone(), db.writer.clone());

        let plain = repo.create_user(new_user("plain@example.com", false)).await.unwrap();
        let other = repo.create_user(new_user("other@example.com", false)).await.unwrap();

        assert!(repo.link_sub_user(plain.id, other.id).await.is_err());
        assert!(repo.link_sub_user(plain.id, plain.id).await.is_err());
        assert!(repo.link_sub_user(999, other.id).await.is_err());
        assert!(repo.get_sub_account_map().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let db = setup_db();
        let repo = UserRepository::new(db.pool.clone(), db.writer.clone());

        repo.create_user(new_user("dup@example.com", false)).await.unwrap();
        let err = repo.create_user(new_user("dup@example.com", false)).await.unwrap_err();
        assert!(matches!(
            err,
            ledgersync_core::Error::Database(ledgersync_core::errors::DatabaseError::UniqueViolation(_))
        ));
    }
}
