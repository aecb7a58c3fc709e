//! Journal entries, project summaries and entry attachments.
//!
//! These tables belong to the journal's CRUD layer; the knowledge index only
//! reads them. The insert helpers exist for that layer and for tests.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;
use crate::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// A journal entry, usually tied to a commit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub repository: String,
    pub commit_hash: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub created_at: String,
}

impl JournalEntry {
    /// Title, or the first line of the content.
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.content.lines().next().unwrap_or("").trim().to_string())
    }
}

/// Per-repository project summary.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub repository: String,
    pub name: String,
    pub summary: String,
    pub updated_at: String,
}

/// File attached to a journal entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EntryAttachment {
    pub id: String,
    pub entry_id: String,
    pub filename: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub size_bytes: i64,
    pub created_at: String,
}

/// Input for creating a journal entry.
#[derive(Debug, Clone)]
pub struct CreateJournalEntry {
    pub id: String,
    pub repository: String,
    pub commit_hash: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub created_at: String,
}

/// Input for creating an attachment.
#[derive(Debug, Clone)]
pub struct CreateEntryAttachment {
    pub id: String,
    pub entry_id: String,
    pub filename: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub size_bytes: i64,
    pub created_at: String,
}

// ============================================================================
// Queries
// ============================================================================

pub async fn create_journal_entry(pool: &DbPool, input: CreateJournalEntry) -> Result<JournalEntry> {
    sqlx::query_as::<_, JournalEntry>(
        r#"
        INSERT INTO journal_entries (id, repository, commit_hash, title, content, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.repository)
    .bind(input.commit_hash.as_ref().map(|h| h.to_lowercase()))
    .bind(&input.title)
    .bind(&input.content)
    .bind(&input.created_at)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Most recent entries for one repository.
pub async fn list_recent_entries(
    pool: &DbPool,
    repository: &str,
    limit: i64,
) -> Result<Vec<JournalEntry>> {
    sqlx::query_as::<_, JournalEntry>(
        r#"
        SELECT * FROM journal_entries
        WHERE repository = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(repository)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Repositories ordered by their latest entry.
pub async fn list_active_repositories(pool: &DbPool, limit: i64) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT repository FROM journal_entries
        GROUP BY repository
        ORDER BY MAX(created_at) DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(r,)| r).collect())
}

pub async fn upsert_project_summary(
    pool: &DbPool,
    id: &str,
    repository: &str,
    name: &str,
    summary: &str,
    updated_at: &str,
) -> Result<ProjectSummary> {
    sqlx::query_as::<_, ProjectSummary>(
        r#"
        INSERT INTO project_summaries (id, repository, name, summary, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(repository) DO UPDATE SET
            name = excluded.name,
            summary = excluded.summary,
            updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(repository)
    .bind(name)
    .bind(summary)
    .bind(updated_at)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Most recently updated project summaries.
pub async fn list_project_summaries(pool: &DbPool, limit: i64) -> Result<Vec<ProjectSummary>> {
    sqlx::query_as::<_, ProjectSummary>(
        "SELECT * FROM project_summaries ORDER BY updated_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

pub async fn create_entry_attachment(
    pool: &DbPool,
    input: CreateEntryAttachment,
) -> Result<EntryAttachment> {
    sqlx::query_as::<_, EntryAttachment>(
        r#"
        INSERT INTO entry_attachments (id, entry_id, filename, mime_type, description, size_bytes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.entry_id)
    .bind(&input.filename)
    .bind(&input.mime_type)
    .bind(&input.description)
    .bind(input.size_bytes)
    .bind(&input.created_at)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Attachments of the given entries, newest first.
pub async fn list_attachments_for_entries(
    pool: &DbPool,
    entry_ids: &[String],
) -> Result<Vec<EntryAttachment>> {
    if entry_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; entry_ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM entry_attachments WHERE entry_id IN ({}) ORDER BY created_at DESC",
        placeholders
    );

    let mut query = sqlx::query_as::<_, EntryAttachment>(&sql);
    for id in entry_ids {
        query = query.bind(id);
    }

    query.fetch_all(pool).await.map_err(Error::Database)
}
