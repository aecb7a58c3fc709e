//! Knowledge index and citation types.

use serde::{Deserialize, Serialize};

use crate::db::{
    EntryAttachment, JournalEntry, LinearIssueRow, LinearProjectRow, NoteRow, ProjectSummary,
};

/// How much of the index the oracle gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Truncated bodies.
    #[default]
    Quick,
    /// Full bodies for journal entries, issues and notes.
    Deep,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Deep => "deep",
        }
    }
}

/// Document listed by the documents companion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub title: String,
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default, alias = "description")]
    pub excerpt: Option<String>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<String>,
}

/// Request-scoped snapshot of everything the oracle may cite.
///
/// Each slice is capped independently and may be empty when its source failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeIndex {
    pub repository: Option<String>,
    pub project_summaries: Vec<ProjectSummary>,
    pub journal_entries: Vec<JournalEntry>,
    pub issues: Vec<LinearIssueRow>,
    pub projects: Vec<LinearProjectRow>,
    pub notes: Vec<NoteRow>,
    pub documents: Vec<DocumentRef>,
    pub attachments: Vec<EntryAttachment>,
}

impl KnowledgeIndex {
    pub fn is_empty(&self) -> bool {
        self.project_summaries.is_empty()
            && self.journal_entries.is_empty()
            && self.issues.is_empty()
            && self.projects.is_empty()
            && self.notes.is_empty()
            && self.documents.is_empty()
            && self.attachments.is_empty()
    }

    /// Distinct repository names that appear in a populated slice, in
    /// first-seen order. The requested scope alone does not count.
    pub fn repositories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        let names = self
            .project_summaries
            .iter()
            .map(|p| p.repository.as_str())
            .chain(self.journal_entries.iter().map(|e| e.repository.as_str()));
        for name in names {
            if !name.is_empty() && !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationType {
    Commit,
    Issue,
    Project,
    Repository,
}

/// Reference from an answer back to an index item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(rename = "type")]
    pub kind: CitationType,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Oracle answer with the sources it cited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAnswer {
    pub answer: String,
    pub sources: Vec<Citation>,
    pub depth_used: Depth,
}
