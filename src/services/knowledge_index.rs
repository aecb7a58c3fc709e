//! Knowledge index builder.
//!
//! Assembles a bounded, recency-ordered snapshot of everything the oracle
//! may cite. Every slice is queried independently and a failing source only
//! empties its own slice.

use std::fmt::Write as _;

use tracing::{debug, warn};

use super::documents::DocumentsClient;
use crate::config::IndexConfig;
use crate::db::{self, DbPool, JournalEntry};
use crate::models::{Depth, KnowledgeIndex};
use crate::Result;

#[derive(Clone)]
pub struct KnowledgeIndexBuilder {
    db: DbPool,
    documents: Option<DocumentsClient>,
    limits: IndexConfig,
}

fn or_empty<T>(slice: &'static str, result: Result<Vec<T>>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!(slice, error = %e, "Index source unavailable, slice left empty");
            Vec::new()
        }
    }
}

impl KnowledgeIndexBuilder {
    pub fn new(db: DbPool, documents: Option<DocumentsClient>, limits: IndexConfig) -> Self {
        Self {
            db,
            documents,
            limits,
        }
    }

    pub fn limits(&self) -> &IndexConfig {
        &self.limits
    }

    /// Build the index, optionally scoped to one repository.
    pub async fn build(&self, repository: Option<&str>) -> KnowledgeIndex {
        let repository = repository.map(str::trim).filter(|r| !r.is_empty());

        let (project_summaries, journal_entries, issues, projects, notes, documents) = tokio::join!(
            db::list_project_summaries(&self.db, self.limits.project_summaries),
            self.journal_slice(repository),
            self.issue_slice(repository),
            db::list_linear_projects(&self.db, false, self.limits.projects),
            db::list_notes(&self.db, false, self.limits.notes),
            self.document_slice(),
        );

        let journal_entries = or_empty("journal_entries", journal_entries);

        let mut recent: Vec<&JournalEntry> = journal_entries.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let entry_ids: Vec<String> = recent
            .into_iter()
            .take(self.limits.attachment_entries)
            .map(|e| e.id.clone())
            .collect();
        let attachments = or_empty(
            "attachments",
            db::list_attachments_for_entries(&self.db, &entry_ids).await,
        );

        let index = KnowledgeIndex {
            repository: repository.map(String::from),
            project_summaries: or_empty("project_summaries", project_summaries),
            journal_entries,
            issues: or_empty("issues", issues),
            projects: or_empty("projects", projects),
            notes: or_empty("notes", notes),
            documents: or_empty("documents", documents),
            attachments,
        };

        debug!(
            repository = ?index.repository,
            project_summaries = index.project_summaries.len(),
            journal_entries = index.journal_entries.len(),
            issues = index.issues.len(),
            projects = index.projects.len(),
            notes = index.notes.len(),
            documents = index.documents.len(),
            attachments = index.attachments.len(),
            "Knowledge index built"
        );

        index
    }

    async fn journal_slice(&self, repository: Option<&str>) -> Result<Vec<JournalEntry>> {
        if let Some(repo) = repository {
            return db::list_recent_entries(&self.db, repo, self.limits.journal_entries).await;
        }

        let repos = db::list_active_repositories(&self.db, self.limits.recent_repositories).await?;
        let mut entries = Vec::new();
        for repo in repos {
            entries.extend(
                db::list_recent_entries(&self.db, &repo, self.limits.entries_per_repository)
                    .await?,
            );
        }
        Ok(entries)
    }

    async fn issue_slice(&self, repository: Option<&str>) -> Result<Vec<db::LinearIssueRow>> {
        match repository {
            Some(repo) => db::list_issues_for_repository(&self.db, repo, self.limits.issues).await,
            None => db::list_linear_issues(&self.db, false, self.limits.issues).await,
        }
    }

    async fn document_slice(&self) -> Result<Vec<crate::models::DocumentRef>> {
        match &self.documents {
            Some(client) => client.list_documents(self.limits.documents).await,
            None => Ok(Vec::new()),
        }
    }

    /// Render the index as a prompt section.
    pub fn render(&self, index: &KnowledgeIndex, depth: Depth) -> String {
        render_index(index, depth, self.limits.snippet_chars)
    }
}

/// Collapse whitespace and cut to `max` characters.
fn snippet(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max).collect();
    cut.push('…');
    cut
}

/// Body text for an item: the summary in quick mode when there is one,
/// otherwise the source text, truncated in quick mode.
fn body(summary: Option<&str>, text: Option<&str>, depth: Depth, max: usize) -> String {
    match depth {
        Depth::Quick => match (summary, text) {
            (Some(s), _) => snippet(s, max),
            (None, Some(t)) => snippet(t, max),
            (None, None) => String::new(),
        },
        Depth::Deep => {
            let text = text.unwrap_or("").trim();
            match summary {
                Some(s) if !text.is_empty() => format!("{}\n  {}", s.trim(), text.replace('\n', "\n  ")),
                Some(s) => s.trim().to_string(),
                None => text.replace('\n', "\n  "),
            }
        }
    }
}

fn section<T>(out: &mut String, title: &str, items: &[T], mut line: impl FnMut(&T) -> String) {
    let _ = writeln!(out, "\n## {}", title);
    if items.is_empty() {
        out.push_str("(none)\n");
        return;
    }
    for item in items {
        let _ = writeln!(out, "- {}", line(item));
    }
}

fn with_body(head: String, body: String) -> String {
    if body.is_empty() {
        head
    } else {
        format!("{}: {}", head, body)
    }
}

/// Render an index as flat text with one section per slice.
pub fn render_index(index: &KnowledgeIndex, depth: Depth, snippet_chars: usize) -> String {
    let mut out = String::from("# Knowledge index\n");
    if let Some(repo) = &index.repository {
        let _ = writeln!(out, "Repository scope: {}", repo);
    }

    section(&mut out, "Project summaries", &index.project_summaries, |p| {
        with_body(
            format!("{} (repository: {})", p.name, p.repository),
            snippet(&p.summary, snippet_chars),
        )
    });

    section(&mut out, "Journal entries", &index.journal_entries, |e| {
        let commit = e
            .commit_hash
            .as_deref()
            .map(|h| format!(" commit {}", h))
            .unwrap_or_default();
        with_body(
            format!("[{}] {}{} {}", e.created_at, e.repository, commit, e.display_title()),
            body(None, Some(&e.content), depth, snippet_chars),
        )
    });

    section(&mut out, "Linear issues", &index.issues, |i| {
        let mut head = format!("{} {}", i.identifier, i.title);
        if let Some(state) = &i.state_name {
            let _ = write!(head, " [{}]", state);
        }
        if let Some(project) = &i.project_name {
            let _ = write!(head, " project: {}", project);
        }
        let labels = i.label_names();
        if !labels.is_empty() {
            let _ = write!(head, " labels: {}", labels.join(", "));
        }
        if let Some(assignee) = &i.assignee_name {
            let _ = write!(head, " assignee: {}", assignee);
        }
        with_body(
            head,
            body(i.summary.as_deref(), i.description.as_deref(), depth, snippet_chars),
        )
    });

    section(&mut out, "Linear projects", &index.projects, |p| {
        let mut head = p.name.clone();
        if let Some(state) = &p.state {
            let _ = write!(head, " [{}]", state);
        }
        if let Some(lead) = &p.lead_name {
            let _ = write!(head, " lead: {}", lead);
        }
        if let Some(target) = &p.target_date {
            let _ = write!(head, " target: {}", target);
        }
        with_body(
            head,
            body(p.summary.as_deref(), p.description.as_deref(), Depth::Quick, snippet_chars),
        )
    });

    section(&mut out, "Notes", &index.notes, |n| {
        let mut head = n.title.clone();
        if let Some(created) = &n.remote_created_at {
            let _ = write!(head, " ({})", created);
        }
        with_body(
            head,
            body(n.summary.as_deref(), n.content.as_deref(), depth, snippet_chars),
        )
    });

    section(&mut out, "Documents", &index.documents, |d| {
        let head = match &d.kind {
            Some(kind) => format!("{} ({})", d.title, kind),
            None => d.title.clone(),
        };
        with_body(
            head,
            d.excerpt
                .as_deref()
                .map(|e| snippet(e, snippet_chars))
                .unwrap_or_default(),
        )
    });

    section(&mut out, "Attachments", &index.attachments, |a| {
        with_body(
            format!("{} ({}, {} bytes) on entry {}", a.filename, a.mime_type, a.size_bytes, a.entry_id),
            a.description.clone().unwrap_or_default(),
        )
    });

    out
}
