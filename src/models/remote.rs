//! Snapshots of remote objects and sync bookkeeping types.

use serde::{Deserialize, Serialize};

/// Workflow states that mark a Linear item as finished.
const CLOSED_STATES: [&str; 3] = ["completed", "canceled", "cancelled"];

/// Entity kinds mirrored into the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    LinearProject,
    LinearIssue,
    Note,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [Self::LinearProject, Self::LinearIssue, Self::Note];

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            Self::LinearProject => "linear_projects",
            Self::LinearIssue => "linear_issues",
            Self::Note => "notes",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinearProject => "project",
            Self::LinearIssue => "issue",
            Self::Note => "note",
        }
    }
}

/// A Linear project as last fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub state: Option<String>,
    pub lead_name: Option<String>,
    pub target_date: Option<String>,
    pub url: Option<String>,
}

impl LinearProject {
    pub fn is_closed(&self) -> bool {
        self.state
            .as_deref()
            .map(|s| CLOSED_STATES.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// A Linear issue as last fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearIssue {
    pub id: String,
    /// Team-scoped key, e.g. `ENG-42`.
    pub identifier: String,
    pub title: String,
    pub description: Option<String>,
    pub state_name: Option<String>,
    /// Workflow category: backlog, unstarted, started, completed, canceled.
    pub state_type: Option<String>,
    pub priority: Option<i64>,
    pub assignee_name: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub labels: Vec<String>,
    pub url: Option<String>,
}

impl LinearIssue {
    pub fn is_closed(&self) -> bool {
        self.state_type
            .as_deref()
            .map(|s| CLOSED_STATES.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Meeting or scratch note from the notes service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub attendees: Vec<NoteAttendee>,
    pub web_url: Option<String>,
    pub remote_created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAttendee {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// What a summary is being generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Project,
    Issue,
    Note,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Issue => "issue",
            Self::Note => "note",
        }
    }
}

/// Input to the summary gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryInput {
    #[serde(rename = "type")]
    pub kind: SummaryKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Outcome of reconciling one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    /// Rows in the cache after the pass, soft-deleted rows included.
    pub total: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSyncResult {
    pub projects: SyncCounts,
    pub issues: SyncCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesSyncResult {
    pub notes: SyncCounts,
}

/// Row counts of one cache table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total: i64,
    pub active: i64,
    pub deleted: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(state_type: Option<&str>) -> LinearIssue {
        LinearIssue {
            id: "i1".into(),
            identifier: "ENG-1".into(),
            title: "t".into(),
            description: None,
            state_name: None,
            state_type: state_type.map(String::from),
            priority: None,
            assignee_name: None,
            project_id: None,
            project_name: None,
            labels: vec![],
            url: None,
        }
    }

    #[test]
    fn test_closed_issue_states() {
        assert!(issue(Some("completed")).is_closed());
        assert!(issue(Some("canceled")).is_closed());
        assert!(!issue(Some("started")).is_closed());
        assert!(!issue(None).is_closed());
    }

    #[test]
    fn test_summary_input_wire_shape() {
        let input = SummaryInput {
            kind: SummaryKind::Issue,
            content: "body".into(),
            title: None,
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["type"], "issue");
        assert!(value.get("title").is_none());
    }
}
