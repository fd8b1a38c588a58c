//! Database models for users.

use chrono::{NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;

use ledgersync_core::users::{NewUser, UserRecord};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserDB {
    pub _id: i64,
    pub email: String,
    pub is_sub_account: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUserDB {
    pub email: String,
    pub is_sub_account: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sub_accounts)]
pub struct SubAccountDB {
    pub master_user_id: i64,
    pub sub_user_id: i64,
}

impl From<NewUser> for NewUserDB {
    fn from(user: NewUser) -> Self {
        Self {
            email: user.email,
            is_sub_account: user.is_sub_account,
            created_at: Utc::now().naive_utc(),
        }
    }
}

impl From<UserDB> for UserRecord {
    fn from(db: UserDB) -> Self {
        Self {
            id: db._id,
            email: db.email,
            is_sub_account: db.is_sub_account,
            created_at: Utc.from_utc_datetime(&db.created_at),
        }
    }
}
