use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use log::info;
use std::sync::Arc;

use crate::collections::ensure_collection_tables;
use crate::db::{
    backup_database, drop_tables_without_fk, get_connection, list_backups, list_tables,
    restore_database, run_migrations, DbPool, WriteHandle,
};
use crate::errors::IntoCore;
use crate::utils::quote_ident;
use ledgersync_core::errors::{DatabaseError, Result};
use ledgersync_core::messaging::{BackupFileMetadata, MaintenanceHandler};

/// Tables whose rows survive `clear_all_tables`.
const PRESERVED_TABLES: [&str; 3] = ["__diesel_schema_migrations", "users", "sub_accounts"];

pub struct MaintenanceRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    db_path: String,
    backup_dir: String,
}

impl MaintenanceRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle, db_path: String, backup_dir: String) -> Self {
        Self {
            pool,
            writer,
            db_path,
            backup_dir,
        }
    }

    fn find_backup(&self, backup_name: Option<&str>) -> Result<BackupFileMetadata> {
        let backups = list_backups(&self.backup_dir)?;
        let found = match backup_name {
            Some(name) => backups.into_iter().find(|b| b.name == name),
            None => backups.into_iter().next(),
        };
        found.ok_or_else(|| {
            DatabaseError::RestoreFailed(match backup_name {
                Some(name) => format!("Backup {} not found", name),
                None => "No backups available".to_string(),
            })
            .into()
        })
    }
}

#[async_trait]
impl MaintenanceHandler for MaintenanceRepository {
    async fn clear_all_tables(&self) -> Result<()> {
        let cleared = self
            .writer
            .exec(|conn| {
                let tables: Vec<String> = list_tables(conn)?
                    .into_iter()
                    .filter(|t| !PRESERVED_TABLES.contains(&t.as_str()))
                    .collect();
                for table in &tables {
                    conn.batch_execute(&format!("DELETE FROM {}", quote_ident(table)))
                        .into_core()?;
                }
                Ok(tables.len())
            })
            .await?;

        info!("Cleared {} tables", cleared);
        Ok(())
    }

    async fn remove_all_tables(&self) -> Result<()> {
        // Foreign key pragmas are ignored inside a transaction, so this runs
        // on a pooled connection rather than through the writer.
        let dropped = {
            let mut conn = get_connection(&self.pool)?;
            let tables = list_tables(&mut conn)?;
            drop_tables_without_fk(&mut conn, &tables)?
        };
        info!("Dropped {} tables, recreating schema", dropped);

        run_migrations(&self.pool)?;
        let mut conn = get_connection(&self.pool)?;
        ensure_collection_tables(&mut conn)
    }

    async fn backup_db(&self) -> Result<String> {
        backup_database(&self.db_path, &self.backup_dir)
    }

    async fn restore_db(&self, backup_name: Option<String>) -> Result<()> {
        let backup = self.find_backup(backup_name.as_deref())?;
        restore_database(&self.db_path, &backup.path)
    }

    async fn backup_files_metadata(&self) -> Result<Vec<BackupFileMetadata>> {
        list_backups(&self.backup_dir)
    }
}
