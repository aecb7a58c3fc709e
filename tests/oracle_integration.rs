//! Knowledge index and oracle integration tests.

mod common;

use common::*;
use devjournal::db::{self, CreateEntryAttachment, CreateJournalEntry};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seed_journal(app: &TestApp) {
    for (id, repo, hash, title, at) in [
        ("e1", "atlas", "0123456789abcdef0123", "Add retries", "2024-03-01T10:00:00.000Z"),
        ("e2", "atlas", "fedcba9876543210fedc", "Tune pool", "2024-03-02T10:00:00.000Z"),
        ("e3", "zephyr", "aaaabbbbccccdddd0000", "Initial import", "2024-02-01T10:00:00.000Z"),
    ] {
        db::create_journal_entry(
            &app.db,
            CreateJournalEntry {
                id: id.into(),
                repository: repo.into(),
                commit_hash: Some(hash.into()),
                title: Some(title.into()),
                content: format!("{} in the {} service", title, repo),
                created_at: at.into(),
            },
        )
        .await
        .unwrap();
    }

    db::create_entry_attachment(
        &app.db,
        CreateEntryAttachment {
            id: "a1".into(),
            entry_id: "e2".into(),
            filename: "pool.png".into(),
            mime_type: "image/png".into(),
            description: Some("Pool metrics".into()),
            size_bytes: 2048,
            created_at: "2024-03-02T10:00:00.000Z".into(),
        },
    )
    .await
    .unwrap();

    db::upsert_project_summary(
        &app.db,
        "s1",
        "atlas",
        "Atlas",
        "Ingestion service for partner feeds",
        "2024-03-02T10:00:00.000Z",
    )
    .await
    .unwrap();
}

async fn seed_linear(app: &TestApp, linear: &MockServer) {
    Mock::given(method("POST"))
        .and(body_string_contains("projects(first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(projects_page(vec![
            linear_project("p1", "Reliability", "started"),
        ])))
        .mount(linear)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("issues(first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issues_page(vec![
            linear_issue("i1", "ENG-1", "Retry fetcher", "started"),
        ])))
        .mount(linear)
        .await;

    let (status, _) = app.call(post_json("/linear/sync", json!({}))).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_index_survives_documents_outage() {
    let linear = MockServer::start().await;
    let documents = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&documents)
        .await;

    let app = TestApp::new(Remotes {
        linear: Some(&linear),
        documents: Some(&documents),
        ..Default::default()
    })
    .await;
    seed_journal(&app).await;
    seed_linear(&app, &linear).await;

    let (status, body) = app.call(get_request("/index")).await;
    assert_eq!(status, 200, "{body}");

    let index = &body["index"];
    assert_eq!(index["journal_entries"].as_array().unwrap().len(), 3);
    assert_eq!(index["issues"].as_array().unwrap().len(), 1);
    assert_eq!(index["projects"].as_array().unwrap().len(), 1);
    assert_eq!(index["attachments"][0]["filename"], "pool.png");
    assert!(index["documents"].as_array().unwrap().is_empty());

    let rendered = body["rendered"].as_str().unwrap();
    assert!(rendered.starts_with("# Knowledge index"));
    assert!(rendered.contains("commit 0123456789abcdef0123"));
    assert!(rendered.contains("## Documents\n(none)"));
}

#[tokio::test]
async fn test_documents_listed_when_service_answers() {
    let documents = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{ "id": "d1", "title": "Runbook", "type": "guide" }]
        })))
        .mount(&documents)
        .await;

    let app = TestApp::new(Remotes {
        documents: Some(&documents),
        ..Default::default()
    })
    .await;

    let (_, body) = app.call(get_request("/index?depth=deep")).await;
    assert_eq!(body["index"]["documents"][0]["kind"], "guide");
    assert!(body["rendered"].as_str().unwrap().contains("Runbook"));
}

#[tokio::test]
async fn test_scoped_index_without_matching_issues() {
    let linear = MockServer::start().await;
    let app = TestApp::new(Remotes {
        linear: Some(&linear),
        ..Default::default()
    })
    .await;
    seed_journal(&app).await;
    seed_linear(&app, &linear).await;

    let (status, body) = app.call(get_request("/index?repository=zephyr")).await;
    assert_eq!(status, 200);

    let index = &body["index"];
    assert_eq!(index["repository"], "zephyr");
    let entries = index["journal_entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["repository"], "zephyr");
    assert!(index["issues"].as_array().unwrap().is_empty());
    assert!(body["rendered"]
        .as_str()
        .unwrap()
        .contains("## Linear issues\n(none)"));

    // Issues follow their project name into the repository scope
    let (_, body) = app.call(get_request("/index?repository=atlas")).await;
    assert_eq!(body["index"]["issues"][0]["identifier"], "ENG-1");
}

#[tokio::test]
async fn test_oracle_answer_cites_sources_once() {
    let linear = MockServer::start().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Why did we add retries?"))
        .and(body_string_contains("ENG-1 Retry fetcher"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(
            "Commit 0123456 added retries for ENG-1 in atlas. See 0123456 and ENG-1 again; \
             Reliability tracks it. Unknown ENG-99 and deadbeef are not cited.",
        )))
        .mount(&llm)
        .await;

    let app = TestApp::new(Remotes {
        linear: Some(&linear),
        llm: Some(&llm),
        ..Default::default()
    })
    .await;
    seed_journal(&app).await;
    seed_linear(&app, &linear).await;

    let (status, body) = app
        .call(post_json(
            "/oracle",
            json!({ "question": "Why did we add retries?", "depth": "deep" }),
        ))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["depth_used"], "deep");

    let sources = body["sources"].as_array().unwrap();
    let pairs: Vec<(&str, &str)> = sources
        .iter()
        .map(|s| (s["type"].as_str().unwrap(), s["identifier"].as_str().unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("commit", "0123456789abcdef0123"),
            ("issue", "ENG-1"),
            ("project", "Reliability"),
            ("repository", "atlas"),
        ]
    );
    assert_eq!(sources[0]["title"], "Add retries");
}

#[tokio::test]
async fn test_oracle_rejects_blank_question() {
    let app = TestApp::new(Remotes::default()).await;

    let (status, body) = app
        .call(post_json("/oracle", json!({ "question": "   " })))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_oracle_without_llm_is_bad_gateway() {
    let app = TestApp::new(Remotes::default()).await;

    let (status, body) = app
        .call(post_json("/oracle", json!({ "question": "Anything new?" })))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "LLM_ERROR");
}
