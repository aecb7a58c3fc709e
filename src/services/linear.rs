//! Linear GraphQL client.
//!
//! Fetches the complete project and issue collections, following
//! `pageInfo` cursors until the last page. Credentials come from the
//! client's own [`LinearClientConfig`]; a request-supplied key produces a
//! scoped copy through [`LinearClient::with_api_key`].

use std::time::Duration;

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::RemoteServiceConfig;
use crate::error::{Error, Result};
use crate::models::{LinearIssue, LinearProject};

/// Safety stop for servers that keep reporting another page.
const MAX_PAGES: usize = 500;

const PROJECTS_QUERY: &str = r#"
    query Projects($first: Int!, $after: String) {
        projects(first: $first, after: $after) {
            nodes { id name description state targetDate url lead { name } }
            pageInfo { hasNextPage endCursor }
        }
    }
"#;

const ISSUES_QUERY: &str = r#"
    query Issues($first: Int!, $after: String) {
        issues(first: $first, after: $after) {
            nodes {
                id identifier title description priority url
                state { name type }
                assignee { name }
                project { id name }
                labels { nodes { name } }
            }
            pageInfo { hasNextPage endCursor }
        }
    }
"#;

/// Endpoint and credentials of one Linear client.
#[derive(Debug, Clone)]
pub struct LinearClientConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub timeout: Duration,
}

impl LinearClientConfig {
    pub fn from_config(config: &RemoteServiceConfig) -> Self {
        Self {
            endpoint: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            page_size: config.page_size.clamp(1, 250),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Linear API client.
#[derive(Clone)]
pub struct LinearClient {
    client: Client,
    config: LinearClientConfig,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    nodes: Vec<T>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectsData {
    projects: Connection<ProjectNode>,
}

#[derive(Debug, Deserialize)]
struct IssuesData {
    issues: Connection<IssueNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectNode {
    id: String,
    name: String,
    description: Option<String>,
    state: Option<String>,
    target_date: Option<String>,
    url: Option<String>,
    lead: Option<NamedNode>,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    id: String,
    identifier: String,
    title: String,
    description: Option<String>,
    priority: Option<f64>,
    url: Option<String>,
    state: Option<StateNode>,
    assignee: Option<NamedNode>,
    project: Option<ProjectRefNode>,
    labels: Option<LabelConnection>,
}

#[derive(Debug, Deserialize)]
struct StateNode {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedNode {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectRefNode {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelConnection {
    nodes: Vec<NamedNode>,
}

impl From<ProjectNode> for LinearProject {
    fn from(node: ProjectNode) -> Self {
        Self {
            id: node.id,
            name: node.name,
            description: node.description.filter(|d| !d.is_empty()),
            state: node.state,
            lead_name: node.lead.and_then(|l| l.name),
            target_date: node.target_date,
            url: node.url,
        }
    }
}

impl From<IssueNode> for LinearIssue {
    fn from(node: IssueNode) -> Self {
        let (state_name, state_type) = node
            .state
            .map(|s| (s.name, s.kind))
            .unwrap_or((None, None));
        let (project_id, project_name) = node
            .project
            .map(|p| (Some(p.id), p.name))
            .unwrap_or((None, None));

        Self {
            id: node.id,
            identifier: node.identifier,
            title: node.title,
            description: node.description.filter(|d| !d.is_empty()),
            state_name,
            state_type,
            priority: node.priority.map(|p| p as i64),
            assignee_name: node.assignee.and_then(|a| a.name),
            project_id,
            project_name,
            labels: node
                .labels
                .map(|l| l.nodes.into_iter().filter_map(|n| n.name).collect())
                .unwrap_or_default(),
            url: node.url,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

impl LinearClient {
    pub fn new(config: LinearClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("devjournal/0.1")
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Copy of this client that authenticates with `api_key`.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        let mut config = self.config.clone();
        config.api_key = Some(api_key.into());
        Self {
            client: self.client.clone(),
            config,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Fetch every project visible to the key.
    pub async fn fetch_projects(&self) -> Result<Vec<LinearProject>> {
        let nodes: Vec<ProjectNode> = self
            .fetch_all(PROJECTS_QUERY, |data: ProjectsData| data.projects)
            .await?;
        info!(count = nodes.len(), "Fetched Linear projects");
        Ok(nodes.into_iter().map(LinearProject::from).collect())
    }

    /// Fetch every issue visible to the key.
    pub async fn fetch_issues(&self) -> Result<Vec<LinearIssue>> {
        let nodes: Vec<IssueNode> = self
            .fetch_all(ISSUES_QUERY, |data: IssuesData| data.issues)
            .await?;
        info!(count = nodes.len(), "Fetched Linear issues");
        Ok(nodes.into_iter().map(LinearIssue::from).collect())
    }

    async fn fetch_all<D, N>(
        &self,
        query: &str,
        connection: impl Fn(D) -> Connection<N>,
    ) -> Result<Vec<N>>
    where
        D: DeserializeOwned,
    {
        let mut nodes = Vec::new();
        let mut after: Option<String> = None;

        for page in 0..MAX_PAGES {
            let variables = json!({
                "first": self.config.page_size,
                "after": after,
            });
            let data: D = self.query(query, variables).await?;
            let conn = connection(data);

            debug!(page, count = conn.nodes.len(), "Linear page");
            nodes.extend(conn.nodes);

            match (conn.page_info.has_next_page, conn.page_info.end_cursor) {
                (true, Some(cursor)) => after = Some(cursor),
                (true, None) => {
                    return Err(Error::Linear(format!(
                        "Next page reported without cursor after page {}",
                        page
                    )));
                }
                (false, _) => return Ok(nodes),
            }
        }

        Err(Error::Linear(format!(
            "Pagination did not finish after {} pages",
            MAX_PAGES
        )))
    }

    async fn query<D: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<D> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Validation("Linear API key is not configured".to_string()))?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(header::AUTHORIZATION, api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| Error::Linear(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Linear(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: GraphQlResponse<D> = response
            .json()
            .await
            .map_err(|e| Error::Linear(format!("Malformed response: {}", e)))?;

        if let Some(first) = body.errors.as_ref().and_then(|errors| errors.first()) {
            return Err(Error::Linear(first.message.clone()));
        }

        body.data
            .ok_or_else(|| Error::Linear("Response contained no data".to_string()))
    }
}
