//! Read-only client for the documents companion service.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::DocumentRef;

#[derive(Clone)]
pub struct DocumentsClient {
    client: Client,
    base_url: String,
}

/// The service answers with either a bare array or an envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentsResponse {
    List(Vec<DocumentRef>),
    Envelope { documents: Vec<DocumentRef> },
}

impl DocumentsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("devjournal/0.1")
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// List up to `limit` documents.
    pub async fn list_documents(&self, limit: u32) -> Result<Vec<DocumentRef>> {
        let response = self
            .client
            .get(format!("{}/api/documents", self.base_url))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| Error::Documents(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Documents(format!("HTTP {}", response.status())));
        }

        let body: DocumentsResponse = response
            .json()
            .await
            .map_err(|e| Error::Documents(format!("Malformed response: {}", e)))?;

        let mut documents = match body {
            DocumentsResponse::List(docs) => docs,
            DocumentsResponse::Envelope { documents } => documents,
        };
        documents.truncate(limit as usize);
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_documents_accepts_envelope_and_caps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/documents"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [
                    { "id": "d1", "title": "Architecture", "type": "markdown" },
                    { "id": "d2", "title": "CV" }
                ]
            })))
            .mount(&server)
            .await;

        let docs = DocumentsClient::new(server.uri())
            .unwrap()
            .list_documents(1)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].kind.as_deref(), Some("markdown"));
    }
}
