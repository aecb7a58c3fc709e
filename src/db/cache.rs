//! Operations shared by every remote cache table.
//!
//! Cache tables never lose rows: removal from the remote side is recorded
//! with `is_deleted` / `deleted_at`, and a later fetch can revive the row.

use std::collections::HashMap;

use async_trait::async_trait;

use super::DbPool;
use crate::models::{CacheKind, CacheStats, FieldUpdate, SummaryInput};
use crate::{Error, Result};

/// What the reconciler needs to know about a cached row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedState {
    pub snapshot_hash: String,
    pub has_summary: bool,
    pub is_deleted: bool,
}

/// A remote snapshot that can be written to its cache table.
#[async_trait]
pub trait CacheRecord: Send + Sync + 'static {
    const KIND: CacheKind;

    fn id(&self) -> &str;

    /// Digest of the snapshot fields, used to detect remote edits.
    fn snapshot_hash(&self) -> String;

    fn summary_input(&self) -> SummaryInput;

    /// Insert a row that does not exist yet.
    async fn insert(&self, pool: &DbPool, summary: Option<&str>, now: &str) -> Result<()>;

    /// Overwrite snapshot fields of an existing row and clear any deletion
    /// marker. `created_at` is never written.
    async fn update(&self, pool: &DbPool, summary: &FieldUpdate<String>, now: &str)
        -> Result<()>;
}

/// Split a summary update into `(write_column, value)` bindings for
/// `summary = CASE WHEN ? THEN ? ELSE summary END`.
pub(crate) fn summary_binding(update: &FieldUpdate<String>) -> (bool, Option<String>) {
    (!update.is_unchanged(), update.value().cloned())
}

/// Load every cached id of a kind, deleted rows included.
pub async fn load_cache_index(
    pool: &DbPool,
    kind: CacheKind,
) -> Result<HashMap<String, CachedState>> {
    let sql = format!(
        "SELECT id, snapshot_hash, summary IS NOT NULL, is_deleted FROM {}",
        kind.table()
    );

    let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .map_err(Error::Database)?;

    Ok(rows
        .into_iter()
        .map(|(id, snapshot_hash, has_summary, is_deleted)| {
            (
                id,
                CachedState {
                    snapshot_hash,
                    has_summary: has_summary != 0,
                    is_deleted: is_deleted != 0,
                },
            )
        })
        .collect())
}

/// Record that a sync pass saw this row without changing it.
pub async fn touch_synced(pool: &DbPool, kind: CacheKind, id: &str, now: &str) -> Result<()> {
    let sql = format!("UPDATE {} SET synced_at = ? WHERE id = ?", kind.table());
    sqlx::query(&sql)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a row deleted. Rows already marked keep their original `deleted_at`.
///
/// Returns true if the row was newly marked.
pub async fn soft_delete(pool: &DbPool, kind: CacheKind, id: &str, now: &str) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET is_deleted = 1, deleted_at = ?, synced_at = ? WHERE id = ? AND is_deleted = 0",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Attach a summary only if the row still has none.
///
/// Returns true if the summary was written.
pub async fn set_summary_if_missing(
    pool: &DbPool,
    kind: CacheKind,
    id: &str,
    summary: &str,
) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET summary = ? WHERE id = ? AND summary IS NULL",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(summary)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Total, active and deleted row counts for a cache table.
pub async fn cache_stats(pool: &DbPool, kind: CacheKind) -> Result<CacheStats> {
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_deleted = 0 THEN 1 ELSE 0 END), 0) FROM {}",
        kind.table()
    );
    let (total, active): (i64, i64) = sqlx::query_as(&sql).fetch_one(pool).await?;

    Ok(CacheStats {
        total,
        active,
        deleted: total - active,
    })
}

/// Parse a JSON array column, substituting an empty list for malformed data.
pub(crate) fn parse_json_list<T: serde::de::DeserializeOwned>(raw: &str) -> Vec<T> {
    match serde_json::from_str(raw) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed list column, using empty default");
            Vec::new()
        }
    }
}
