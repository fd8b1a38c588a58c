//! Database model for the single progress row.

use diesel::prelude::*;
use log::warn;

use ledgersync_core::progress::StoredProgress;

/// Id of the only row of the `progress` table.
pub const PROGRESS_ROW_ID: i32 = 1;

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProgressDB {
    pub id: i32,
    pub value: Option<f64>,
    pub error: Option<String>,
    pub state: Option<String>,
    pub updated_at: i64,
}

impl ProgressDB {
    pub fn new(progress: &StoredProgress, updated_at: i64) -> Self {
        Self {
            id: PROGRESS_ROW_ID,
            value: progress.value,
            error: progress.error.clone(),
            state: progress.state.map(|s| s.as_str().to_string()),
            updated_at,
        }
    }
}

impl From<ProgressDB> for StoredProgress {
    fn from(db: ProgressDB) -> Self {
        let state = db.state.as_deref().and_then(|s| match s.parse() {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring stored progress state: {}", e);
                None
            }
        });
        Self {
            value: db.value,
            error: db.error,
            state,
        }
    }
}
