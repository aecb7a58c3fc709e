//! Notes service REST client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::RemoteServiceConfig;
use crate::error::{Error, Result};
use crate::models::{Note, NoteAttendee};

const MAX_PAGES: usize = 500;

/// Endpoint and credentials of one notes client.
#[derive(Debug, Clone)]
pub struct NotesClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub timeout: Duration,
}

impl NotesClientConfig {
    pub fn from_config(config: &RemoteServiceConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            page_size: config.page_size.clamp(1, 100),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct NotesClient {
    client: Client,
    config: NotesClientConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotesPage {
    #[serde(default)]
    notes: Vec<NoteWire>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteWire {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "summary_markdown", alias = "summaryText")]
    content: Option<String>,
    #[serde(default)]
    attendees: Vec<AttendeeWire>,
    #[serde(default, alias = "web_url")]
    web_url: Option<String>,
    #[serde(default, alias = "created_at")]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttendeeWire {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl From<NoteWire> for Note {
    fn from(wire: NoteWire) -> Self {
        Self {
            id: wire.id,
            title: wire
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            content: wire.content.filter(|c| !c.is_empty()),
            attendees: wire
                .attendees
                .into_iter()
                .map(|a| NoteAttendee {
                    name: a.name,
                    email: a.email,
                })
                .collect(),
            web_url: wire.web_url,
            remote_created_at: wire.created_at,
        }
    }
}

impl NotesClient {
    pub fn new(config: NotesClientConfig) -> Result<Self> {
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

    /// Fetch every note, following the `cursor` until `hasMore` is false.
    pub async fn fetch_notes(&self) -> Result<Vec<Note>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Validation("Notes API key is not configured".to_string()))?;

        let url = format!("{}/v1/notes", self.config.base_url);
        let limit = self.config.page_size.to_string();
        let mut notes = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(api_key)
                .query(&[("limit", limit.as_str())]);
            if let Some(c) = cursor.as_deref() {
                request = request.query(&[("cursor", c)]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Notes(format!("Request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Notes(format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                )));
            }

            let body: NotesPage = response
                .json()
                .await
                .map_err(|e| Error::Notes(format!("Malformed response: {}", e)))?;

            debug!(page, count = body.notes.len(), "Notes page");
            notes.extend(body.notes.into_iter().map(Note::from));

            match (body.has_more, body.cursor) {
                (true, Some(next)) => cursor = Some(next),
                (true, None) => {
                    return Err(Error::Notes(format!(
                        "Next page reported without cursor after page {}",
                        page
                    )));
                }
                (false, _) => {
                    info!(count = notes.len(), "Fetched notes");
                    return Ok(notes);
                }
            }
        }

        Err(Error::Notes(format!(
            "Pagination did not finish after {} pages",
            MAX_PAGES
        )))
    }
}
