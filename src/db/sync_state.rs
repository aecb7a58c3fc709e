//! Last successful sync per integration.

use serde::Serialize;
use sqlx::FromRow;

use super::DbPool;
use crate::{Error, Result};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SyncState {
    pub source: String,
    pub last_sync_at: String,
    /// JSON of the last sync result.
    pub last_result: Option<String>,
}

/// Record a completed sync pass.
pub async fn record_sync(
    pool: &DbPool,
    source: &str,
    at: &str,
    result: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_state (source, last_sync_at, last_result)
        VALUES (?, ?, ?)
        ON CONFLICT(source) DO UPDATE SET
            last_sync_at = excluded.last_sync_at,
            last_result = excluded.last_result
        "#,
    )
    .bind(source)
    .bind(at)
    .bind(result.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Get the sync state for an integration, if it ever synced.
pub async fn get_sync_state(pool: &DbPool, source: &str) -> Result<Option<SyncState>> {
    sqlx::query_as::<_, SyncState>("SELECT * FROM sync_state WHERE source = ?")
        .bind(source)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};

    #[tokio::test]
    async fn test_record_sync_overwrites() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();

        assert!(get_sync_state(&pool, "linear").await.unwrap().is_none());

        record_sync(&pool, "linear", "2024-01-01T00:00:00.000Z", &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        record_sync(&pool, "linear", "2024-01-02T00:00:00.000Z", &serde_json::json!({"a": 2}))
            .await
            .unwrap();

        let state = get_sync_state(&pool, "linear").await.unwrap().unwrap();
        assert_eq!(state.last_sync_at, "2024-01-02T00:00:00.000Z");
        assert_eq!(state.last_result.as_deref(), Some(r#"{"a":2}"#));
    }
}
