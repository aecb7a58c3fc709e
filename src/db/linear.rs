//! Linear cache queries.
//!
//! Projects and issues mirrored from Linear by the reconciler.

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use sqlx::FromRow;

use super::cache::{parse_json_list, summary_binding, CacheRecord};
use super::DbPool;
use crate::models::{
    hash_snapshot, CacheKind, FieldUpdate, LinearIssue, LinearProject, SummaryInput, SummaryKind,
};
use crate::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Cached Linear project.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearProjectRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub state: Option<String>,
    pub lead_name: Option<String>,
    pub target_date: Option<String>,
    pub url: Option<String>,
    #[serde(skip)]
    pub snapshot_hash: String,
    pub summary: Option<String>,
    pub synced_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
}

/// Cached Linear issue.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearIssueRow {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub description: Option<String>,
    pub state_name: Option<String>,
    pub state_type: Option<String>,
    pub priority: Option<i64>,
    pub assignee_name: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    /// JSON array of label names.
    #[serde(serialize_with = "serialize_json_list")]
    pub labels: String,
    pub url: Option<String>,
    #[serde(skip)]
    pub snapshot_hash: String,
    pub summary: Option<String>,
    pub synced_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
}

impl LinearIssueRow {
    /// Label names; malformed stored data reads as no labels.
    pub fn label_names(&self) -> Vec<String> {
        parse_json_list(&self.labels)
    }
}

fn serialize_json_list<S: Serializer>(raw: &str, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    parse_json_list::<serde_json::Value>(raw).serialize(serializer)
}

// ============================================================================
// Cache records
// ============================================================================

#[async_trait]
impl CacheRecord for LinearProject {
    const KIND: CacheKind = CacheKind::LinearProject;

    fn id(&self) -> &str {
        &self.id
    }

    fn snapshot_hash(&self) -> String {
        hash_snapshot(self)
    }

    fn summary_input(&self) -> SummaryInput {
        SummaryInput {
            kind: SummaryKind::Project,
            content: self.description.clone().unwrap_or_default(),
            title: Some(self.name.clone()),
        }
    }

    async fn insert(&self, pool: &DbPool, summary: Option<&str>, now: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO linear_projects (
                id, name, description, state, lead_name, target_date, url,
                snapshot_hash, summary, synced_at, created_at, updated_at, is_deleted, deleted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
            "#,
        )
        .bind(&self.id)
        .bind(&self.name)
        .bind(&self.description)
        .bind(&self.state)
        .bind(&self.lead_name)
        .bind(&self.target_date)
        .bind(&self.url)
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
            UPDATE linear_projects SET
                name = ?, description = ?, state = ?, lead_name = ?, target_date = ?, url = ?,
                snapshot_hash = ?,
                summary = CASE WHEN ? THEN ? ELSE summary END,
                synced_at = ?, updated_at = ?,
                is_deleted = 0, deleted_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(&self.name)
        .bind(&self.description)
        .bind(&self.state)
        .bind(&self.lead_name)
        .bind(&self.target_date)
        .bind(&self.url)
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

#[async_trait]
impl CacheRecord for LinearIssue {
    const KIND: CacheKind = CacheKind::LinearIssue;

    fn id(&self) -> &str {
        &self.id
    }

    fn snapshot_hash(&self) -> String {
        hash_snapshot(self)
    }

    fn summary_input(&self) -> SummaryInput {
        SummaryInput {
            kind: SummaryKind::Issue,
            content: self.description.clone().unwrap_or_default(),
            title: Some(format!("{} {}", self.identifier, self.title)),
        }
    }

    async fn insert(&self, pool: &DbPool, summary: Option<&str>, now: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO linear_issues (
                id, identifier, title, description, state_name, state_type, priority,
                assignee_name, project_id, project_name, labels, url,
                snapshot_hash, summary, synced_at, created_at, updated_at, is_deleted, deleted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
            "#,
        )
        .bind(&self.id)
        .bind(&self.identifier)
        .bind(&self.title)
        .bind(&self.description)
        .bind(&self.state_name)
        .bind(&self.state_type)
        .bind(self.priority)
        .bind(&self.assignee_name)
        .bind(&self.project_id)
        .bind(&self.project_name)
        .bind(serde_json::to_string(&self.labels)?)
        .bind(&self.url)
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
            UPDATE linear_issues SET
                identifier = ?, title = ?, description = ?, state_name = ?, state_type = ?,
                priority = ?, assignee_name = ?, project_id = ?, project_name = ?, labels = ?,
                url = ?, snapshot_hash = ?,
                summary = CASE WHEN ? THEN ? ELSE summary END,
                synced_at = ?, updated_at = ?,
                is_deleted = 0, deleted_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(&self.identifier)
        .bind(&self.title)
        .bind(&self.description)
        .bind(&self.state_name)
        .bind(&self.state_type)
        .bind(self.priority)
        .bind(&self.assignee_name)
        .bind(&self.project_id)
        .bind(&self.project_name)
        .bind(serde_json::to_string(&self.labels)?)
        .bind(&self.url)
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

// ============================================================================
// Queries
// ============================================================================

/// List cached projects, most recently updated first.
pub async fn list_linear_projects(
    pool: &DbPool,
    include_deleted: bool,
    limit: i64,
) -> Result<Vec<LinearProjectRow>> {
    sqlx::query_as::<_, LinearProjectRow>(
        r#"
        SELECT * FROM linear_projects
        WHERE (? OR is_deleted = 0)
        ORDER BY updated_at DESC, name ASC
        LIMIT ?
        "#,
    )
    .bind(include_deleted)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// List cached issues, most recently updated first.
pub async fn list_linear_issues(
    pool: &DbPool,
    include_deleted: bool,
    limit: i64,
) -> Result<Vec<LinearIssueRow>> {
    sqlx::query_as::<_, LinearIssueRow>(
        r#"
        SELECT * FROM linear_issues
        WHERE (? OR is_deleted = 0)
        ORDER BY updated_at DESC, identifier ASC
        LIMIT ?
        "#,
    )
    .bind(include_deleted)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Active issues that belong to a repository: the Linear project name matches
/// it (case-insensitive) or one of the labels is exactly the repository name.
pub async fn list_issues_for_repository(
    pool: &DbPool,
    repository: &str,
    limit: i64,
) -> Result<Vec<LinearIssueRow>> {
    sqlx::query_as::<_, LinearIssueRow>(
        r#"
        SELECT * FROM linear_issues
        WHERE is_deleted = 0
          AND (
            lower(project_name) = lower(?)
            OR EXISTS (
                SELECT 1
                FROM json_each(CASE WHEN json_valid(labels) THEN labels ELSE '[]' END)
                WHERE value = ?
            )
          )
        ORDER BY updated_at DESC, identifier ASC
        LIMIT ?
        "#,
    )
    .bind(repository)
    .bind(repository)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Get a cached issue by its team identifier (e.g. `ENG-42`).
pub async fn get_linear_issue_by_identifier(
    pool: &DbPool,
    identifier: &str,
) -> Result<Option<LinearIssueRow>> {
    sqlx::query_as::<_, LinearIssueRow>("SELECT * FROM linear_issues WHERE identifier = ?")
        .bind(identifier)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}
