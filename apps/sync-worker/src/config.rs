use std::path::Path;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "./data/ledgersync.db";
const DEFAULT_BACKFILL_INTERVAL_SECS: u64 = 10 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub backup_dir: String,
    pub backfill_interval: Duration,
    /// `text` or `json`.
    pub log_format: String,
}

impl Config {
    /// Reads `LS_*` variables, loading a `.env` file first when present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = std::env::var("LS_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let backup_dir = std::env::var("LS_BACKUP_DIR")
            .unwrap_or_else(|_| default_backup_dir(&db_path));
        let backfill_interval =
            parse_interval(std::env::var("LS_BACKFILL_INTERVAL_SECS").ok().as_deref());
        let log_format = log_format_from_env();

        Self {
            db_path,
            backup_dir,
            backfill_interval,
            log_format,
        }
    }
}

/// `LS_LOG_FORMAT`, defaulting to `text`. Read before the rest of the config so
/// that warnings raised while parsing it reach the subscriber.
pub fn log_format_from_env() -> String {
    dotenvy::dotenv().ok();
    std::env::var("LS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string())
}

/// `backups/` next to the database file.
pub fn default_backup_dir(db_path: &str) -> String {
    Path::new(db_path)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("backups")
        .to_string_lossy()
        .into_owned()
}

fn parse_interval(raw: Option<&str>) -> Duration {
    let secs = match raw.map(str::trim) {
        None | Some("") => DEFAULT_BACKFILL_INTERVAL_SECS,
        Some(value) => match value.parse::<u64>() {
            Ok(0) | Err(_) => {
                log::warn!(
                    "Ignoring LS_BACKFILL_INTERVAL_SECS={}, using {}s",
                    value,
                    DEFAULT_BACKFILL_INTERVAL_SECS
                );
                DEFAULT_BACKFILL_INTERVAL_SECS
            }
            Ok(secs) => secs,
        },
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_falls_back_on_bad_values() {
        let default = Duration::from_secs(DEFAULT_BACKFILL_INTERVAL_SECS);
        assert_eq!(parse_interval(None), default);
        assert_eq!(parse_interval(Some("abc")), default);
        assert_eq!(parse_interval(Some("0")), default);
        assert_eq!(parse_interval(Some(" 30 ")), Duration::from_secs(30));
    }

    #[test]
    fn test_backup_dir_sits_next_to_database() {
        assert_eq!(
            default_backup_dir("/var/lib/ledgersync/app.db"),
            "/var/lib/ledgersync/backups"
        );
        assert_eq!(default_backup_dir("app.db"), "backups");
    }
}
