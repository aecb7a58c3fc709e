//! Citation extraction.
//!
//! Scans a generated answer for identifiers and keeps only those that
//! resolve to an item of the knowledge index. Matchers run in a fixed order:
//! commit hashes, issue identifiers, project names, repository names.
//! Within a matcher, citations follow their first appearance in the text.

use std::collections::HashSet;

use regex::Regex;

use crate::models::{Citation, CitationType, KnowledgeIndex};

pub struct CitationExtractor {
    commit_pattern: Regex,
    issue_pattern: Regex,
}

impl Default for CitationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates citations, dropping repeated `(type, identifier)` pairs.
#[derive(Default)]
struct Sources {
    seen: HashSet<(CitationType, String)>,
    list: Vec<Citation>,
}

impl Sources {
    fn push(&mut self, kind: CitationType, identifier: &str, title: Option<String>) {
        if self.seen.insert((kind, identifier.to_string())) {
            self.list.push(Citation {
                kind,
                identifier: identifier.to_string(),
                title,
            });
        }
    }
}

/// Names found in `text`, ordered by first occurrence.
fn names_in_text<'a>(text: &str, names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut found: Vec<(usize, &str)> = names
        .filter(|name| !name.trim().is_empty())
        .filter_map(|name| text.find(name).map(|pos| (pos, name)))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, name)| name).collect()
}

impl CitationExtractor {
    pub fn new() -> Self {
        Self {
            commit_pattern: Regex::new(r"\b[0-9a-fA-F]{7,40}\b").expect("static pattern"),
            issue_pattern: Regex::new(r"\b[A-Z][A-Z0-9]*-\d+\b").expect("static pattern"),
        }
    }

    /// Citations for every identifier in `answer` that resolves in `index`.
    pub fn extract_sources(&self, answer: &str, index: &KnowledgeIndex) -> Vec<Citation> {
        let mut sources = Sources::default();

        for m in self.commit_pattern.find_iter(answer) {
            let prefix = m.as_str().to_lowercase();
            let entry = index.journal_entries.iter().find(|e| {
                e.commit_hash
                    .as_deref()
                    .map(|h| h.to_lowercase().starts_with(&prefix))
                    .unwrap_or(false)
            });
            if let Some(entry) = entry {
                if let Some(hash) = &entry.commit_hash {
                    sources.push(CitationType::Commit, hash, Some(entry.display_title()));
                }
            }
        }

        for m in self.issue_pattern.find_iter(answer) {
            if let Some(issue) = index.issues.iter().find(|i| i.identifier == m.as_str()) {
                sources.push(CitationType::Issue, &issue.identifier, Some(issue.title.clone()));
            }
        }

        let project_names = index
            .projects
            .iter()
            .map(|p| p.name.as_str())
            .chain(index.project_summaries.iter().map(|p| p.name.as_str()));
        for name in names_in_text(answer, project_names) {
            sources.push(CitationType::Project, name, None);
        }

        for name in names_in_text(answer, index.repositories().into_iter()) {
            sources.push(CitationType::Repository, name, None);
        }

        sources.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{JournalEntry, LinearIssueRow, ProjectSummary};
    use rstest::rstest;

    fn entry(hash: &str, repository: &str) -> JournalEntry {
        JournalEntry {
            id: format!("e-{}", hash),
            repository: repository.into(),
            commit_hash: Some(hash.into()),
            title: Some(format!("Commit {}", &hash[..7])),
            content: "body".into(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    fn issue(identifier: &str, title: &str) -> LinearIssueRow {
        LinearIssueRow {
            id: identifier.to_lowercase(),
            identifier: identifier.into(),
            title: title.into(),
            description: None,
            state_name: None,
            state_type: None,
            priority: None,
            assignee_name: None,
            project_id: None,
            project_name: None,
            labels: "[]".into(),
            url: None,
            snapshot_hash: String::new(),
            summary: None,
            synced_at: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    fn index() -> KnowledgeIndex {
        KnowledgeIndex {
            journal_entries: vec![
                entry("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678", "atlas"),
                entry("ffee0011223344556677", "beacon"),
            ],
            issues: vec![issue("ENG-42", "Fix login"), issue("OPS-7", "Rotate keys")],
            project_summaries: vec![ProjectSummary {
                id: "s1".into(),
                repository: "atlas".into(),
                name: "Atlas Ingest".into(),
                summary: "Ingestion".into(),
                updated_at: String::new(),
            }],
            ..KnowledgeIndex::default()
        }
    }

    fn identifiers(citations: &[Citation]) -> Vec<(CitationType, &str)> {
        citations
            .iter()
            .map(|c| (c.kind, c.identifier.as_str()))
            .collect()
    }

    #[rstest]
    #[case("Fixed in a1b2c3d.", Some("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678"))]
    #[case("Fixed in A1B2C3D4E5.", Some("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678"))]
    #[case("See ffee0011223344556677 for details", Some("ffee0011223344556677"))]
    #[case("Too short: a1b2c3", None)]
    #[case("Unknown deadbeefcafe", None)]
    fn test_commit_matching(#[case] answer: &str, #[case] expected: Option<&str>) {
        let sources = CitationExtractor::new().extract_sources(answer, &index());
        let commits: Vec<&str> = sources
            .iter()
            .filter(|c| c.kind == CitationType::Commit)
            .map(|c| c.identifier.as_str())
            .collect();
        assert_eq!(commits, expected.into_iter().collect::<Vec<_>>());
    }

    #[rstest]
    #[case("ENG-42 is done", vec!["ENG-42"])]
    #[case("eng-42 is lowercase", vec![])]
    #[case("ENG-4 is not ENG-42 but OPS-7 is", vec!["ENG-42", "OPS-7"])]
    #[case("ENG-999 does not exist", vec![])]
    fn test_issue_matching(#[case] answer: &str, #[case] expected: Vec<&str>) {
        let sources = CitationExtractor::new().extract_sources(answer, &index());
        let issues: Vec<&str> = sources
            .iter()
            .filter(|c| c.kind == CitationType::Issue)
            .map(|c| c.identifier.as_str())
            .collect();
        assert_eq!(issues, expected);
    }

    #[test]
    fn test_repeated_commit_is_cited_once() {
        let answer = "a1b2c3d landed, then a1b2c3d4 was reverted";
        let sources = CitationExtractor::new().extract_sources(answer, &index());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title.as_deref(), Some("Commit a1b2c3d"));
    }

    #[test]
    fn test_order_follows_matcher_category() {
        let answer = "In beacon, OPS-7 touched Atlas Ingest after ffee001122 and a1b2c3d.";
        let sources = CitationExtractor::new().extract_sources(answer, &index());
        assert_eq!(
            identifiers(&sources),
            vec![
                (CitationType::Commit, "ffee0011223344556677"),
                (CitationType::Commit, "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678"),
                (CitationType::Issue, "OPS-7"),
                (CitationType::Project, "Atlas Ingest"),
                (CitationType::Repository, "beacon"),
            ]
        );
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let sources = CitationExtractor::new().extract_sources("atlas ingest and BEACON", &index());
        assert_eq!(identifiers(&sources), vec![(CitationType::Repository, "atlas")]);
    }

    #[test]
    fn test_scope_without_data_is_not_cited() {
        let scoped = KnowledgeIndex {
            repository: Some("ghost".into()),
            ..index()
        };
        let sources =
            CitationExtractor::new().extract_sources("Nothing landed in ghost yet", &scoped);
        assert!(sources.is_empty());
        assert_eq!(scoped.repositories(), vec!["atlas", "beacon"]);
    }

    #[test]
    fn test_empty_index_cites_nothing() {
        let sources = CitationExtractor::new()
            .extract_sources("ENG-42 a1b2c3d atlas", &KnowledgeIndex::default());
        assert!(sources.is_empty());
    }
}
