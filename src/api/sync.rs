//! Sync Routes
//!
//! Trigger sync passes and read the mirrored caches.
//!
//! Routes:
//! - POST /linear/sync - Run a Linear pass
//! - GET /linear/sync - Last Linear pass and cache counts
//! - GET /linear/cache - Cached Linear projects and issues
//! - POST /notes/sync - Run a notes pass
//! - GET /notes/sync - Last notes pass and cache counts
//! - GET /notes/cache - Cached notes

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, LinearIssueRow, LinearProjectRow, NoteView};
use crate::models::{CacheKind, CacheStats, LinearSyncResult, NotesSyncResult};
use crate::services::{
    LinearSyncOptions, NotesSyncOptions, SummaryMode, LINEAR_SOURCE, NOTES_SOURCE,
};
use crate::{AppState, Result};

const DEFAULT_CACHE_LIMIT: i64 = 100;
const MAX_CACHE_LIMIT: i64 = 500;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/linear/sync", post(sync_linear).get(linear_status))
        .route("/linear/cache", get(linear_cache))
        .route("/notes/sync", post(sync_notes).get(notes_status))
        .route("/notes/cache", get(notes_cache))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearSyncRequest {
    #[serde(default)]
    pub include_completed: bool,
    pub api_key: Option<String>,
    /// Return before summaries are generated.
    #[serde(default)]
    pub detach_summaries: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesSyncRequest {
    pub api_key: Option<String>,
    #[serde(default)]
    pub detach_summaries: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse<R> {
    pub success: bool,
    pub message: String,
    pub sync_result: R,
    pub last_sync: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse<S> {
    pub status: &'static str,
    pub last_sync: Option<String>,
    pub stats: S,
}

#[derive(Debug, Serialize)]
pub struct LinearStats {
    pub projects: CacheStats,
    pub issues: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct NotesStats {
    pub notes: CacheStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheQuery {
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<i64>,
}

impl CacheQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_CACHE_LIMIT)
            .clamp(1, MAX_CACHE_LIMIT)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearCacheResponse {
    pub projects: Vec<LinearProjectRow>,
    pub issues: Vec<LinearIssueRow>,
    pub stats: LinearStats,
    pub last_sync: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesCacheResponse {
    pub notes: Vec<NoteView>,
    pub stats: NotesStats,
    pub last_sync: Option<String>,
}

fn summary_mode(detach: bool) -> SummaryMode {
    if detach {
        SummaryMode::Detached
    } else {
        SummaryMode::Inline
    }
}

async fn linear_stats(state: &AppState) -> Result<LinearStats> {
    Ok(LinearStats {
        projects: db::cache_stats(&state.db, CacheKind::LinearProject).await?,
        issues: db::cache_stats(&state.db, CacheKind::LinearIssue).await?,
    })
}

async fn notes_stats(state: &AppState) -> Result<NotesStats> {
    Ok(NotesStats {
        notes: db::cache_stats(&state.db, CacheKind::Note).await?,
    })
}

// ============================================================================
// Linear Handlers
// ============================================================================

/// Run a Linear sync pass.
///
/// POST /linear/sync
async fn sync_linear(
    State(state): State<AppState>,
    body: Option<Json<LinearSyncRequest>>,
) -> Result<Json<SyncResponse<LinearSyncResult>>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let result = state
        .sync
        .sync_linear(LinearSyncOptions {
            include_completed: request.include_completed,
            api_key: request.api_key,
            summaries: summary_mode(request.detach_summaries),
        })
        .await?;

    Ok(Json(SyncResponse {
        success: true,
        message: format!(
            "Synced {} projects and {} issues",
            result.projects.total, result.issues.total
        ),
        sync_result: result,
        last_sync: state.sync.last_sync(LINEAR_SOURCE).await?,
    }))
}

/// Last Linear pass and cache counts.
///
/// GET /linear/sync
async fn linear_status(
    State(state): State<AppState>,
) -> Result<Json<SyncStatusResponse<LinearStats>>> {
    Ok(Json(SyncStatusResponse {
        status: "cached",
        last_sync: state.sync.last_sync(LINEAR_SOURCE).await?,
        stats: linear_stats(&state).await?,
    }))
}

/// Cached Linear projects and issues.
///
/// GET /linear/cache?includeDeleted=bool&limit=N
async fn linear_cache(
    State(state): State<AppState>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<LinearCacheResponse>> {
    let limit = query.limit();

    Ok(Json(LinearCacheResponse {
        projects: db::list_linear_projects(&state.db, query.include_deleted, limit).await?,
        issues: db::list_linear_issues(&state.db, query.include_deleted, limit).await?,
        stats: linear_stats(&state).await?,
        last_sync: state.sync.last_sync(LINEAR_SOURCE).await?,
    }))
}

// ============================================================================
// Notes Handlers
// ============================================================================

/// Run a notes sync pass.
///
/// POST /notes/sync
async fn sync_notes(
    State(state): State<AppState>,
    body: Option<Json<NotesSyncRequest>>,
) -> Result<Json<SyncResponse<NotesSyncResult>>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let result = state
        .sync
        .sync_notes(NotesSyncOptions {
            api_key: request.api_key,
            summaries: summary_mode(request.detach_summaries),
        })
        .await?;

    Ok(Json(SyncResponse {
        success: true,
        message: format!("Synced {} notes", result.notes.total),
        sync_result: result,
        last_sync: state.sync.last_sync(NOTES_SOURCE).await?,
    }))
}

/// Last notes pass and cache counts.
///
/// GET /notes/sync
async fn notes_status(State(state): State<AppState>) -> Result<Json<SyncStatusResponse<NotesStats>>> {
    Ok(Json(SyncStatusResponse {
        status: "cached",
        last_sync: state.sync.last_sync(NOTES_SOURCE).await?,
        stats: notes_stats(&state).await?,
    }))
}

/// Cached notes.
///
/// GET /notes/cache?includeDeleted=bool&limit=N
async fn notes_cache(
    State(state): State<AppState>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<NotesCacheResponse>> {
    let notes = db::list_notes(&state.db, query.include_deleted, query.limit())
        .await?
        .into_iter()
        .map(NoteView::from)
        .collect();

    Ok(Json(NotesCacheResponse {
        notes,
        stats: notes_stats(&state).await?,
        last_sync: state.sync.last_sync(NOTES_SOURCE).await?,
    }))
}
