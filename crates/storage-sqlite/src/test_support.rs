//! Shared fixtures for repository tests.

use std::sync::Arc;
use tempfile::TempDir;

use crate::collections::ensure_collection_tables;
use crate::db::{create_pool, get_connection, run_migrations, spawn_writer, DbPool, WriteHandle};

/// A migrated database in a temp dir. Keep the `TempDir` alive for the
/// duration of the test.
pub struct TestDb {
    pub pool: Arc<DbPool>,
    pub writer: WriteHandle,
    pub db_path: String,
    pub dir: TempDir,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db").to_string_lossy().to_string();

    let pool = create_pool(&db_path).expect("Failed to create pool");
    run_migrations(&pool).expect("Failed to run migrations");
    {
        let mut conn = get_connection(&pool).expect("Failed to get connection");
        ensure_collection_tables(&mut conn).expect("Failed to create collection tables");
    }

    // spawn_writer takes the pool by value
    let writer = spawn_writer((*pool).clone());

    TestDb {
        pool,
        writer,
        db_path,
        dir,
    }
}
