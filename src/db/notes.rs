//! Notes cache queries.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::FromRow;

use super::cache::{parse_json_list, summary_binding, CacheRecord};
use super::DbPool;
use crate::models::{
    hash_snapshot, CacheKind, FieldUpdate, Note, NoteAttendee, SummaryInput, SummaryKind,
};
use crate::{Error, Result};

/// Cached note.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRow {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    /// JSON array of attendees.
    #[serde(skip)]
    pub attendees: String,
    pub web_url: Option<String>,
    pub remote_created_at: Option<String>,
    #[serde(skip)]
    pub snapshot_hash: String,
    pub summary: Option<String>,
    pub synced_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
}

impl NoteRow {
    /// Attendees; malformed stored data reads as nobody.
    pub fn attendee_list(&self) -> Vec<NoteAttendee> {
        parse_json_list(&self.attendees)
    }
}

/// API view of a cached note with attendees decoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteView {
    #[serde(flatten)]
    pub row: NoteRow,
    #[serde(rename = "attendees")]
    pub attendee_list: Vec<NoteAttendee>,
}

impl From<NoteRow> for NoteView {
    fn from(row: NoteRow) -> Self {
        let attendee_list = row.attendee_list();
        Self { row, attendee_list }
    }
}

#[async_trait]
impl CacheRecord for Note {
    const KIND: CacheKind = CacheKind::Note;

    fn id(&self) -> &str {
        &self.id
    }

    fn snapshot_hash(&self) -> String {
        hash_snapshot(self)
    }

    fn summary_input(&self) -> SummaryInput {
        SummaryInput {
            kind: SummaryKind::Note,
            content: self.content.clone().unwrap_or_default(),
            title: Some(self.title.clone()),
        }
    }

    async fn insert(&self, pool: &DbPool, summary: Option<&str>, now: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notes (
                id, title, content, attendees, web_url, remote_created_at,
                snapshot_hash, summary, synced_at, created_at, updated_at, is_deleted, deleted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
            "#,
        )
        .bind(&self.id)
        .bind(&self.title)
        .bind(&self.content)
        .bind(serde_json::to_string(&self.attendees)?)
        .bind(&self.web_url)
        .bind(&self.remote_created_at)
        .bind(self.snapshot_hash())
        .bind(summary)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        pool: &DbPool,
        summary: &FieldUpdate<String>,
        now: &str,
    ) -> Result<()> {
        let (write_summary, summary_value) = summary_binding(summary);
        sqlx::query(
            r#"
            UPDATE notes SET
                title = ?, content = ?, attendees = ?, web_url = ?, remote_created_at = ?,
                snapshot_hash = ?,
                summary = CASE WHEN ? THEN ? ELSE summary END,
                synced_at = ?, updated_at = ?,
                is_deleted = 0, deleted_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(&self.title)
        .bind(&self.content)
        .bind(serde_json::to_string(&self.attendees)?)
        .bind(&self.web_url)
        .bind(&self.remote_created_at)
        .bind(self.snapshot_hash())
        .bind(write_summary)
        .bind(summary_value)
        .bind(now)
        .bind(now)
        .bind(&self.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// List cached notes, most recently updated first.
pub async fn list_notes(pool: &DbPool, include_deleted: bool, limit: i64) -> Result<Vec<NoteRow>> {
    sqlx::query_as::<_, NoteRow>(
        r#"
        SELECT * FROM notes
        WHERE (? OR is_deleted = 0)
        ORDER BY updated_at DESC, title ASC
        LIMIT ?
        "#,
    )
    .bind(include_deleted)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Get a cached note by ID.
pub async fn get_note(pool: &DbPool, id: &str) -> Result<NoteRow> {
    sqlx::query_as::<_, NoteRow>("SELECT * FROM notes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Note not found: {}", id)))
}
