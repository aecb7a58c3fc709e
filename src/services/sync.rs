//! Sync passes for each integration.
//!
//! A pass fetches the complete remote collections first and only then
//! reconciles them, so a failed fetch never leaves a half-written cache.

use tracing::{debug, info};

use super::linear::LinearClient;
use super::notes::NotesClient;
use super::reconcile::{Reconciler, SummaryMode};
use crate::db::{self, DbPool};
use crate::models::{timestamp, LinearSyncResult, NotesSyncResult};
use crate::Result;

pub const LINEAR_SOURCE: &str = "linear";
pub const NOTES_SOURCE: &str = "notes";

/// Options for one Linear pass.
#[derive(Debug, Clone, Default)]
pub struct LinearSyncOptions {
    /// Keep completed and cancelled projects and issues.
    pub include_completed: bool,
    /// Key for this pass only; the configured key is used otherwise.
    pub api_key: Option<String>,
    pub summaries: SummaryMode,
}

/// Options for one notes pass.
#[derive(Debug, Clone, Default)]
pub struct NotesSyncOptions {
    pub api_key: Option<String>,
    pub summaries: SummaryMode,
}

#[derive(Clone)]
pub struct SyncService {
    db: DbPool,
    linear: LinearClient,
    notes: NotesClient,
    reconciler: Reconciler,
}

fn scoped_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

impl SyncService {
    pub fn new(db: DbPool, linear: LinearClient, notes: NotesClient, reconciler: Reconciler) -> Self {
        Self {
            db,
            linear,
            notes,
            reconciler,
        }
    }

    /// Mirror Linear projects and issues into the cache.
    pub async fn sync_linear(&self, options: LinearSyncOptions) -> Result<LinearSyncResult> {
        let client = match scoped_key(options.api_key) {
            Some(key) => self.linear.with_api_key(key),
            None => self.linear.clone(),
        };

        info!(include_completed = options.include_completed, "Starting Linear sync");

        let (mut projects, mut issues) =
            tokio::try_join!(client.fetch_projects(), client.fetch_issues())?;

        if !options.include_completed {
            let (before_projects, before_issues) = (projects.len(), issues.len());
            projects.retain(|p| !p.is_closed());
            issues.retain(|i| !i.is_closed());
            debug!(
                projects = before_projects - projects.len(),
                issues = before_issues - issues.len(),
                "Filtered closed Linear items"
            );
        }

        let projects = self
            .reconciler
            .reconcile(projects, options.summaries)
            .await?
            .counts;
        let issues = self
            .reconciler
            .reconcile(issues, options.summaries)
            .await?
            .counts;

        let result = LinearSyncResult { projects, issues };
        db::record_sync(&self.db, LINEAR_SOURCE, &timestamp(), &serde_json::to_value(result)?)
            .await?;

        info!(?result, "Linear sync complete");
        Ok(result)
    }

    /// Mirror notes into the cache.
    pub async fn sync_notes(&self, options: NotesSyncOptions) -> Result<NotesSyncResult> {
        let client = match scoped_key(options.api_key) {
            Some(key) => self.notes.with_api_key(key),
            None => self.notes.clone(),
        };

        info!("Starting notes sync");

        let notes = client.fetch_notes().await?;
        let notes = self.reconciler.reconcile(notes, options.summaries).await?.counts;

        let result = NotesSyncResult { notes };
        db::record_sync(&self.db, NOTES_SOURCE, &timestamp(), &serde_json::to_value(result)?)
            .await?;

        info!(?result, "Notes sync complete");
        Ok(result)
    }

    /// Time of the last completed pass for a source.
    pub async fn last_sync(&self, source: &str) -> Result<Option<String>> {
        Ok(db::get_sync_state(&self.db, source)
            .await?
            .map(|state| state.last_sync_at))
    }
}
