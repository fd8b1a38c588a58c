//! Naming and lifecycle contract of per-run staging tables.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::collections::Collection;
use crate::constants::STAGING_TABLE_PREFIX;
use crate::errors::Result;

/// Table-name prefix owned by one run: `temp_s{runId}_`.
pub fn staging_prefix(run_id: i64) -> String {
    format!("{}{}_", STAGING_TABLE_PREFIX, run_id)
}

pub fn staging_table_name(run_id: i64, collection: Collection) -> String {
    format!("{}{}", staging_prefix(run_id), collection.table_name())
}

fn staging_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^temp_s(\d+)_(.+)$").expect("Invalid regex pattern"))
}

/// Splits a staging table name into its run id and main table name.
pub fn parse_staging_table(name: &str) -> Option<(i64, &str)> {
    let caps = staging_name_regex().captures(name)?;
    let run_id = caps.get(1)?.as_str().parse().ok()?;
    let suffix = caps.get(2)?.as_str();
    Some((run_id, suffix))
}

/// Staging tables among `table_names` whose run is not in `active_run_ids`.
///
/// Names that do not parse as staging tables are never returned.
pub fn orphaned_staging_tables(table_names: &[String], active_run_ids: &[i64]) -> Vec<String> {
    let active: HashSet<i64> = active_run_ids.iter().copied().collect();
    table_names
        .iter()
        .filter(|name| matches!(parse_staging_table(name), Some((run_id, _)) if !active.contains(&run_id)))
        .cloned()
        .collect()
}

/// How staging tables are selected for a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableMatch {
    /// Only `prefix + <registered collection>` tables.
    #[default]
    Exact,
    /// Every table starting with the run prefix. Unknown suffixes are an error.
    Prefix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOptions {
    /// When false the merge joins a transaction the caller already holds on
    /// the same connection and leaves commit or rollback to it.
    pub commits_own_transaction: bool,
    pub table_match: TableMatch,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            commits_own_transaction: true,
            table_match: TableMatch::Exact,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub run_id: i64,
    pub merged: Vec<MergedCollection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedCollection {
    pub collection: Collection,
    pub rows: usize,
}

impl MergeSummary {
    pub fn total_rows(&self) -> usize {
        self.merged.iter().map(|m| m.rows).sum()
    }
}

/// Staging & merge engine over the storage backend.
#[async_trait]
pub trait StagingRepositoryTrait: Send + Sync {
    /// Creates a fresh shadow table per collection for `run_id`.
    async fn begin(&self, run_id: i64, collections: &[Collection]) -> Result<()>;

    /// Upserts every shadow row into its main table, then drops the run's
    /// shadow tables. All or nothing. Runs in a transaction of its own and
    /// rejects options that ask to join the caller's.
    async fn merge_to_main(&self, run_id: i64, opts: MergeOptions) -> Result<MergeSummary>;

    /// Drops the run's shadow tables. Idempotent.
    fn abort(&self, run_id: i64) -> Result<usize>;

    /// Drops shadow tables of runs that are not NEW, LOCKED or ERROR.
    fn sweep_orphans(&self) -> Result<Vec<String>>;

    fn has_table(&self, name: &str) -> Result<bool>;

    fn list_staging_tables(&self, run_id: i64) -> Result<Vec<String>>;
}
