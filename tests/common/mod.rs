//! Common test utilities and helpers.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use devjournal::config::{Config, RemoteServiceConfig};
use devjournal::db::{self, DbPool};
use devjournal::{api, AppState};
use devjournal_llm::ProviderConfig;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::MockServer;

/// Extract JSON body from response
pub async fn extract_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Create a GET request
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Create a POST request with JSON body
pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Endpoints the test app talks to.
#[derive(Default)]
pub struct Remotes<'a> {
    pub linear: Option<&'a MockServer>,
    pub notes: Option<&'a MockServer>,
    pub documents: Option<&'a MockServer>,
    pub llm: Option<&'a MockServer>,
    /// Leave the Linear and notes keys unset.
    pub without_keys: bool,
}

/// Test application over an in-memory database.
pub struct TestApp {
    pub db: DbPool,
    pub state: AppState,
}

impl TestApp {
    pub async fn new(remotes: Remotes<'_>) -> Self {
        let pool = db::init_pool(":memory:").await.unwrap();
        db::initialize_schema(&pool).await.unwrap();

        let key = |k: &str| (!remotes.without_keys).then(|| k.to_string());
        let mut config = Config::default();
        config.linear = RemoteServiceConfig {
            base_url: remotes
                .linear
                .map(|s| format!("{}/graphql", s.uri()))
                .unwrap_or_else(|| "http://127.0.0.1:9/graphql".into()),
            api_key: key("lin_configured"),
            page_size: 50,
        };
        config.notes = RemoteServiceConfig {
            base_url: remotes
                .notes
                .map(|s| s.uri())
                .unwrap_or_else(|| "http://127.0.0.1:9".into()),
            api_key: key("notes_configured"),
            page_size: 50,
        };
        config.documents.base_url = remotes.documents.map(|s| s.uri());
        if let Some(llm) = remotes.llm {
            let mut provider = ProviderConfig::with_defaults("openai", "sk-test", 1);
            provider.base_url = llm.uri();
            config.llm.providers = vec![provider];
        }

        let state = AppState::from_config(pool.clone(), &config).unwrap();
        Self { db: pool, state }
    }

    pub fn router(&self) -> Router {
        api::app(self.state.clone())
    }

    pub async fn call(&self, request: Request<Body>) -> (u16, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        (status, extract_json(response).await)
    }
}

// ============================================================================
// Remote payloads
// ============================================================================

pub fn linear_issue(id: &str, identifier: &str, title: &str, state_type: &str) -> Value {
    json!({
        "id": id,
        "identifier": identifier,
        "title": title,
        "description": format!("Description of {}", title),
        "priority": 2.0,
        "url": format!("https://linear.app/acme/issue/{}", identifier),
        "state": { "name": state_type, "type": state_type },
        "assignee": { "name": "Ana" },
        "project": { "id": "p1", "name": "atlas" },
        "labels": { "nodes": [{ "name": "backend" }] }
    })
}

pub fn linear_project(id: &str, name: &str, state: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": format!("The {} project", name),
        "state": state,
        "targetDate": null,
        "url": null,
        "lead": { "name": "Ana" }
    })
}

pub fn projects_page(nodes: Vec<Value>) -> Value {
    json!({ "data": { "projects": {
        "nodes": nodes,
        "pageInfo": { "hasNextPage": false, "endCursor": null }
    }}})
}

pub fn issues_page(nodes: Vec<Value>) -> Value {
    json!({ "data": { "issues": {
        "nodes": nodes,
        "pageInfo": { "hasNextPage": false, "endCursor": null }
    }}})
}

pub fn chat_completion(content: &str) -> Value {
    json!({ "choices": [{ "message": { "content": content } }] })
}
