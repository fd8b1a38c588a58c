use chrono::{DateTime, Utc};
use log::{error, info};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::{Connection, SimpleConnection};
use diesel::r2d2;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use diesel::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::errors::{IntoCore, StorageError};
use ledgersync_core::errors::{DatabaseError, Error, Result};
use ledgersync_core::messaging::BackupFileMetadata;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub mod write_actor;
pub use write_actor::{spawn_writer, WriteHandle};

const BACKUP_FILE_PREFIX: &str = "ledgersync_backup_";

/// Creates the database file if needed and switches it to WAL mode.
/// Returns the path that was opened.
pub fn init(db_path: &str) -> Result<String> {
    if let Some(db_dir) = Path::new(db_path).parent() {
        if !db_dir.as_os_str().is_empty() && !db_dir.exists() {
            fs::create_dir_all(db_dir)?;
        }
    }

    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    conn.batch_execute(
        "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 30000;
            PRAGMA synchronous  = NORMAL;
        ",
    )
    .into_core()?;

    Ok(db_path.to_string())
}

/// Database path inside `app_data_dir`, unless `DATABASE_URL` overrides it.
pub fn get_db_path(app_data_dir: &str) -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        Path::new(app_data_dir)
            .join("ledgersync.db")
            .to_string_lossy()
            .into_owned()
    })
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = r2d2::Pool::builder()
        .max_size(8)
        .min_idle(Some(1))
        .connection_timeout(std::time::Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionCustomizer {}))
        .build(manager)
        .map_err(|e| DatabaseError::PoolCreationFailed(e.to_string()))?;
    Ok(Arc::new(pool))
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Running database migrations");
    let mut connection = get_connection(pool)?;

    let result = connection.run_pending_migrations(MIGRATIONS).map_err(|e| {
        error!("Database migration failed: {}", e);
        Error::Database(DatabaseError::MigrationFailed(e.to_string()))
    })?;

    if result.is_empty() {
        info!("No pending migrations to apply.");
    } else {
        info!("Applied the following migrations:");
        for migration_version in &result {
            info!("  - {}", migration_version);
        }
    }

    Ok(())
}

/// Gets a connection from the pool
pub fn get_connection(pool: &Pool<ConnectionManager<SqliteConnection>>) -> Result<DbConnection> {
    pool.get().into_core()
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

/// Names of all user tables, sorted.
pub fn list_tables(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let rows: Vec<TableName> = diesel::sql_query(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )
    .load(conn)
    .into_core()?;
    Ok(rows.into_iter().map(|r| r.name).collect())
}

pub fn table_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let rows: Vec<TableName> = diesel::sql_query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind::<Text, _>(name)
    .load(conn)
    .into_core()?;
    Ok(!rows.is_empty())
}

/// Drops `tables` with foreign keys disabled. Foreign keys are switched back
/// on even when a drop fails. Must run outside a transaction, where the
/// pragma is a no-op.
pub fn drop_tables_without_fk(conn: &mut SqliteConnection, tables: &[String]) -> Result<usize> {
    conn.batch_execute("PRAGMA foreign_keys = OFF").into_core()?;

    let mut dropped = 0;
    let mut outcome: Result<()> = Ok(());
    for table in tables {
        match conn.batch_execute(&format!("DROP TABLE IF EXISTS \"{}\"", table)) {
            Ok(()) => dropped += 1,
            Err(e) => {
                error!("Failed to drop table {}: {}", table, e);
                outcome = Err(StorageError::from(e).into());
                break;
            }
        }
    }

    if let Err(e) = conn.batch_execute("PRAGMA foreign_keys = ON") {
        error!("Failed to re-enable foreign keys: {}", e);
        if outcome.is_ok() {
            outcome = Err(StorageError::from(e).into());
        }
    }

    outcome.map(|_| dropped)
}

fn backup_failed(e: impl std::fmt::Display) -> Error {
    Error::Database(DatabaseError::BackupFailed(e.to_string()))
}

fn restore_failed(e: impl std::fmt::Display) -> Error {
    Error::Database(DatabaseError::RestoreFailed(e.to_string()))
}

/// Writes a consistent snapshot of the database at `db_path` into the new
/// file `target`. Other connections keep reading and writing meanwhile.
fn snapshot_into(db_path: &str, target: &str) -> std::result::Result<(), String> {
    let mut conn = SqliteConnection::establish(db_path).map_err(|e| e.to_string())?;
    conn.batch_execute("PRAGMA busy_timeout = 30000")
        .map_err(|e| e.to_string())?;
    diesel::sql_query("VACUUM INTO ?")
        .bind::<Text, _>(target)
        .execute(&mut conn)
        .map_err(|e| e.to_string())?;
    Ok(())
}

pub fn backup_database(db_path: &str, backup_dir: &str) -> Result<String> {
    fs::create_dir_all(backup_dir).map_err(|e| {
        error!("Failed to create backup directory: {}", e);
        backup_failed(e)
    })?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let backup_path = Path::new(backup_dir)
        .join(format!("{}{}.db", BACKUP_FILE_PREFIX, timestamp))
        .to_string_lossy()
        .into_owned();

    info!("Creating database backup from {} to {}", db_path, backup_path);
    snapshot_into(db_path, &backup_path).map_err(|e| {
        error!("Database backup failed: {}", e);
        backup_failed(e)
    })?;

    info!("Database backup created successfully");
    Ok(backup_path)
}

/// Replaces the contents of the database at `db_path` with
/// `backup_file_path`. The current database is snapshotted next to it as
/// `*.pre-restore-*` first.
///
/// The pages are copied through SQLite's online backup API, which takes the
/// database write lock, so pooled and writer connections stay valid and see
/// the restored data on their next statement.
pub fn restore_database(db_path: &str, backup_file_path: &str) -> Result<()> {
    info!("Restoring database from {} to {}", backup_file_path, db_path);

    if !Path::new(backup_file_path).exists() {
        return Err(restore_failed("Backup file not found"));
    }

    if Path::new(db_path).exists() {
        let pre_restore = format!(
            "{}.pre-restore-{}",
            db_path,
            Utc::now().format("%Y%m%d_%H%M%S_%3f")
        );
        snapshot_into(db_path, &pre_restore).map_err(restore_failed)?;
        info!("Created pre-restore backup at: {}", pre_restore);
    }

    let mut conn = rusqlite::Connection::open(db_path).map_err(restore_failed)?;
    conn.busy_timeout(Duration::from_secs(30))
        .map_err(restore_failed)?;
    conn.restore(
        rusqlite::DatabaseName::Main,
        backup_file_path,
        None::<fn(rusqlite::backup::Progress)>,
    )
    .map_err(|e| {
        error!("Database restore failed: {}", e);
        restore_failed(e)
    })?;

    info!("Database restored successfully");
    Ok(())
}

/// Backup files in `backup_dir`, newest first.
pub fn list_backups(backup_dir: &str) -> Result<Vec<BackupFileMetadata>> {
    let dir = Path::new(backup_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(BACKUP_FILE_PREFIX) || !name.ends_with(".db") {
            continue;
        }
        let metadata = entry.metadata()?;
        backups.push(BackupFileMetadata {
            name,
            path: entry.path().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    backups.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then(b.name.cmp(&a.name)));
    Ok(backups)
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 30000;
            PRAGMA synchronous = NORMAL;
        ",
        )
        .map_err(diesel::r2d2::Error::QueryError)?;

        Ok(())
    }
}
