//! Reconciliation engine.
//!
//! Converges one cache table onto a freshly fetched remote collection:
//!
//! 1. Load every cached id with its snapshot hash, summary presence and
//!    deletion marker.
//! 2. Insert new ids, rewrite ids whose snapshot changed or that were
//!    soft-deleted, and only touch `synced_at` on rows that are unchanged.
//! 3. Soft-delete cached ids missing from the fetch.
//!
//! Summaries are generated only for rows without one whose content is long
//! enough. Generation failures are logged and never fail the pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::summary::SummaryGenerator;
use crate::db::{
    cache_stats, load_cache_index, set_summary_if_missing, soft_delete, touch_synced, CacheRecord,
    CachedState, DbPool,
};
use crate::models::{timestamp, CacheKind, FieldUpdate, SyncCounts};
use crate::Result;

/// When summaries for a pass are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryMode {
    /// Generated during the pass and written with the row.
    #[default]
    Inline,
    /// Generated by a background task after the pass returns.
    Detached,
}

/// Result of one reconciliation pass.
#[derive(Debug)]
pub struct PassOutcome {
    pub counts: SyncCounts,
    /// Background summary task in [`SummaryMode::Detached`]. Dropping the
    /// handle leaves the task running. Resolves to the number of summaries
    /// written.
    pub detached: Option<JoinHandle<u32>>,
}

/// One lock per entity kind; passes over the same table never overlap.
#[derive(Default)]
struct KindLocks {
    projects: Mutex<()>,
    issues: Mutex<()>,
    notes: Mutex<()>,
}

impl KindLocks {
    fn get(&self, kind: CacheKind) -> &Mutex<()> {
        match kind {
            CacheKind::LinearProject => &self.projects,
            CacheKind::LinearIssue => &self.issues,
            CacheKind::Note => &self.notes,
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    db: DbPool,
    summarizer: Arc<dyn SummaryGenerator>,
    min_content_length: usize,
    concurrency: usize,
    locks: Arc<KindLocks>,
}

struct Planned<T> {
    item: T,
    cached: Option<CachedState>,
    wants_summary: bool,
}

impl Reconciler {
    pub fn new(
        db: DbPool,
        summarizer: Arc<dyn SummaryGenerator>,
        min_content_length: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            db,
            summarizer,
            min_content_length,
            concurrency: concurrency.max(1),
            locks: Arc::new(KindLocks::default()),
        }
    }

    fn is_summarizable<T: CacheRecord>(&self, item: &T) -> bool {
        item.summary_input().content.trim().chars().count() > self.min_content_length
    }

    /// Reconcile the cache table of `T` against the complete remote collection.
    pub async fn reconcile<T>(&self, items: Vec<T>, mode: SummaryMode) -> Result<PassOutcome>
    where
        T: CacheRecord + Clone,
    {
        let kind = T::KIND;
        let _guard = self.locks.get(kind).lock().await;

        let now = timestamp();
        let cached = load_cache_index(&self.db, kind).await?;

        let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
        let mut plan = Vec::with_capacity(items.len());
        for item in items {
            if !seen.insert(item.id().to_string()) {
                warn!(kind = kind.as_str(), id = item.id(), "Duplicate id in remote fetch, ignoring");
                continue;
            }
            let state = cached.get(item.id()).cloned();
            let has_summary = state.as_ref().map(|s| s.has_summary).unwrap_or(false);
            let wants_summary = !has_summary && self.is_summarizable(&item);
            plan.push(Planned {
                item,
                cached: state,
                wants_summary,
            });
        }

        let summaries = match mode {
            SummaryMode::Inline => {
                let wanted: Vec<T> = plan
                    .iter()
                    .filter(|p| p.wants_summary)
                    .map(|p| p.item.clone())
                    .collect();
                self.generate_summaries(wanted).await
            }
            SummaryMode::Detached => HashMap::new(),
        };

        let mut counts = SyncCounts::default();
        let mut pending = Vec::new();

        for entry in &plan {
            let id = entry.item.id();
            let summary = summaries.get(id);

            match &entry.cached {
                None => {
                    entry
                        .item
                        .insert(&self.db, summary.map(String::as_str), &now)
                        .await?;
                    counts.created += 1;
                }
                Some(state) => {
                    let changed = state.snapshot_hash != entry.item.snapshot_hash();
                    if changed || state.is_deleted || summary.is_some() {
                        let update = summary
                            .cloned()
                            .map(FieldUpdate::Set)
                            .unwrap_or_default();
                        entry.item.update(&self.db, &update, &now).await?;
                        if state.is_deleted {
                            debug!(kind = kind.as_str(), id, "Revived soft-deleted row");
                        }
                        counts.updated += 1;
                    } else {
                        touch_synced(&self.db, kind, id, &now).await?;
                    }
                }
            }

            if mode == SummaryMode::Detached && entry.wants_summary {
                pending.push(entry.item.clone());
            }
        }

        for (id, state) in &cached {
            if state.is_deleted || seen.contains(id) {
                continue;
            }
            if soft_delete(&self.db, kind, id, &now).await? {
                counts.deleted += 1;
            }
        }

        counts.total = u32::try_from(cache_stats(&self.db, kind).await?.total).unwrap_or(u32::MAX);

        info!(
            kind = kind.as_str(),
            created = counts.created,
            updated = counts.updated,
            deleted = counts.deleted,
            total = counts.total,
            summaries = summaries.len(),
            "Reconciliation pass complete"
        );

        let detached = (!pending.is_empty()).then(|| self.spawn_detached(pending));

        Ok(PassOutcome { counts, detached })
    }

    /// Generate summaries concurrently. Failed items are left out.
    async fn generate_summaries<T>(&self, items: Vec<T>) -> HashMap<String, String>
    where
        T: CacheRecord,
    {
        stream::iter(items)
            .map(|item| {
                let summarizer = self.summarizer.clone();
                async move {
                    match summarizer.summarize(&item.summary_input()).await {
                        Ok(summary) => Some((item.id().to_string(), summary)),
                        Err(e) => {
                            warn!(
                                kind = T::KIND.as_str(),
                                id = item.id(),
                                error = %e,
                                "Summary generation failed, storing row without summary"
                            );
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(futures::future::ready)
            .collect()
            .await
    }

    fn spawn_detached<T>(&self, items: Vec<T>) -> JoinHandle<u32>
    where
        T: CacheRecord + Clone,
    {
        let db = self.db.clone();
        let summarizer = self.summarizer.clone();
        let concurrency = self.concurrency;

        tokio::spawn(async move {
            let written: Vec<bool> = stream::iter(items)
                .map(|item| {
                    let db = db.clone();
                    let summarizer = summarizer.clone();
                    async move {
                        let summary = match summarizer.summarize(&item.summary_input()).await {
                            Ok(summary) => summary,
                            Err(e) => {
                                warn!(kind = T::KIND.as_str(), id = item.id(), error = %e, "Detached summary failed");
                                return false;
                            }
                        };
                        match set_summary_if_missing(&db, T::KIND, item.id(), &summary).await {
                            Ok(written) => written,
                            Err(e) => {
                                warn!(kind = T::KIND.as_str(), id = item.id(), error = %e, "Failed to store detached summary");
                                false
                            }
                        }
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let count = written.into_iter().filter(|w| *w).count() as u32;
            debug!(kind = T::KIND.as_str(), count, "Detached summaries written");
            count
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_linear_issue_by_identifier, init_pool, initialize_schema, list_linear_issues};
    use crate::models::{LinearIssue, SummaryInput};
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSummaries {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeSummaries {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SummaryGenerator for FakeSummaries {
        async fn summarize(&self, input: &SummaryInput) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Llm("provider down".into()));
            }
            Ok(format!("Summary of {}", input.title.clone().unwrap_or_default()))
        }
    }

    fn issue(id: &str, identifier: &str, title: &str, long: bool) -> LinearIssue {
        LinearIssue {
            id: id.into(),
            identifier: identifier.into(),
            title: title.into(),
            description: Some(if long { "x".repeat(150) } else { "short".into() }),
            state_name: Some("Todo".into()),
            state_type: Some("unstarted".into()),
            priority: Some(2),
            assignee_name: None,
            project_id: None,
            project_name: Some("api".into()),
            labels: vec!["backend".into()],
            url: None,
        }
    }

    fn three_issues() -> Vec<LinearIssue> {
        vec![
            issue("i1", "ENG-1", "One", false),
            issue("i2", "ENG-2", "Two", false),
            issue("i3", "ENG-3", "Three", false),
        ]
    }

    async fn setup(fail: bool) -> (DbPool, Reconciler, Arc<FakeSummaries>) {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        let fake = FakeSummaries::new(fail);
        let reconciler = Reconciler::new(pool.clone(), fake.clone(), 100, 4);
        (pool, reconciler, fake)
    }

    #[tokio::test]
    async fn test_three_new_issues_are_created() {
        let (_pool, reconciler, _) = setup(false).await;
        let outcome = reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();
        assert_eq!(
            outcome.counts,
            SyncCounts { created: 3, updated: 0, deleted: 0, total: 3 }
        );
    }

    #[tokio::test]
    async fn test_inline_pass_runs_on_spawned_task() {
        let (_pool, reconciler, fake) = setup(false).await;
        let handle = tokio::spawn(async move {
            let items = vec![issue("i1", "ENG-1", "One", true)];
            reconciler.reconcile(items, SummaryMode::Inline).await
        });
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.counts.created, 1);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_edit_and_removal_counts() {
        let (pool, reconciler, _) = setup(false).await;
        reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();

        let mut next = three_issues();
        next.pop();
        next[0].title = "One (edited)".into();

        let outcome = reconciler.reconcile(next, SummaryMode::Inline).await.unwrap();
        assert_eq!(
            outcome.counts,
            SyncCounts { created: 0, updated: 1, deleted: 1, total: 3 }
        );

        let all = list_linear_issues(&pool, true, 10).await.unwrap();
        let removed = all.iter().find(|r| r.id == "i3").unwrap();
        assert!(removed.is_deleted);
        assert!(removed.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_second_identical_pass_is_idempotent() {
        let (_pool, reconciler, _) = setup(false).await;
        let first = reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();
        let second = reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();

        assert_eq!(second.counts.created, 0);
        assert_eq!(second.counts.updated, 0);
        assert_eq!(second.counts.deleted, 0);
        assert_eq!(second.counts.total, first.counts.total);
    }

    #[tokio::test]
    async fn test_deleted_at_is_not_restamped() {
        let (pool, reconciler, _) = setup(false).await;
        reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();
        reconciler.reconcile(Vec::<LinearIssue>::new(), SummaryMode::Inline).await.unwrap();
        let before = get_linear_issue_by_identifier(&pool, "ENG-1").await.unwrap().unwrap();

        let outcome = reconciler.reconcile(Vec::<LinearIssue>::new(), SummaryMode::Inline).await.unwrap();
        let after = get_linear_issue_by_identifier(&pool, "ENG-1").await.unwrap().unwrap();

        assert_eq!(outcome.counts.deleted, 0);
        assert_eq!(outcome.counts.total, 3);
        assert_eq!(before.deleted_at, after.deleted_at);
    }

    #[tokio::test]
    async fn test_revival_preserves_created_at() {
        let (pool, reconciler, _) = setup(false).await;
        reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();
        let original = get_linear_issue_by_identifier(&pool, "ENG-2").await.unwrap().unwrap();

        reconciler.reconcile(Vec::<LinearIssue>::new(), SummaryMode::Inline).await.unwrap();
        let outcome = reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();
        let revived = get_linear_issue_by_identifier(&pool, "ENG-2").await.unwrap().unwrap();

        assert_eq!(outcome.counts.updated, 3);
        assert_eq!(outcome.counts.created, 0);
        assert!(!revived.is_deleted);
        assert!(revived.deleted_at.is_none());
        assert_eq!(revived.created_at, original.created_at);
    }

    #[tokio::test]
    async fn test_summary_failure_still_inserts() {
        let (pool, reconciler, fake) = setup(true).await;
        let items = vec![issue("i1", "ENG-1", "Long", true)];

        let outcome = reconciler.reconcile(items, SummaryMode::Inline).await.unwrap();
        assert_eq!(outcome.counts.created, 1);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        let row = get_linear_issue_by_identifier(&pool, "ENG-1").await.unwrap().unwrap();
        assert!(row.summary.is_none());
    }

    #[tokio::test]
    async fn test_short_content_is_not_summarized() {
        let (_pool, reconciler, fake) = setup(false).await;
        reconciler.reconcile(three_issues(), SummaryMode::Inline).await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backfill_never_overwrites_existing_summary() {
        let (pool, _, _) = setup(false).await;
        let failing = Reconciler::new(pool.clone(), FakeSummaries::new(true), 100, 4);
        let working_fake = FakeSummaries::new(false);
        let working = Reconciler::new(pool.clone(), working_fake.clone(), 100, 4);

        let items = vec![issue("i1", "ENG-1", "Long", true)];
        failing.reconcile(items.clone(), SummaryMode::Inline).await.unwrap();

        // Backfill on the next pass counts as an update.
        let outcome = working.reconcile(items.clone(), SummaryMode::Inline).await.unwrap();
        assert_eq!(outcome.counts.updated, 1);
        let row = get_linear_issue_by_identifier(&pool, "ENG-1").await.unwrap().unwrap();
        assert_eq!(row.summary.as_deref(), Some("Summary of ENG-1 Long"));

        sqlx::query("UPDATE linear_issues SET summary = 'hand written'")
            .execute(&pool)
            .await
            .unwrap();

        let mut edited = items.clone();
        edited[0].description = Some("y".repeat(200));
        working.reconcile(edited, SummaryMode::Inline).await.unwrap();

        let row = get_linear_issue_by_identifier(&pool, "ENG-1").await.unwrap().unwrap();
        assert_eq!(row.summary.as_deref(), Some("hand written"));
        assert_eq!(working_fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detached_summaries_land_after_pass() {
        let (pool, reconciler, _) = setup(false).await;
        let items = vec![issue("i1", "ENG-1", "Long", true)];

        let outcome = reconciler.reconcile(items, SummaryMode::Detached).await.unwrap();
        assert_eq!(outcome.counts.created, 1);

        let written = outcome.detached.expect("detached task").await.unwrap();
        assert_eq!(written, 1);

        let row = get_linear_issue_by_identifier(&pool, "ENG-1").await.unwrap().unwrap();
        assert_eq!(row.summary.as_deref(), Some("Summary of ENG-1 Long"));
    }

    #[tokio::test]
    async fn test_concurrent_passes_are_serialized() {
        let (_pool, reconciler, _) = setup(false).await;
        let a = reconciler.clone();
        let b = reconciler.clone();

        let (first, second) = tokio::join!(
            a.reconcile(three_issues(), SummaryMode::Inline),
            b.reconcile(three_issues(), SummaryMode::Inline)
        );
        let mut created = vec![first.unwrap().counts.created, second.unwrap().counts.created];
        created.sort();
        assert_eq!(created, vec![0, 3]);
    }
}
