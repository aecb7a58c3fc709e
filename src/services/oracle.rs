//! Question answering over the knowledge index.

use std::sync::Arc;

use devjournal_llm::{GenerateRequest, LlmService};
use tracing::info;

use super::citations::CitationExtractor;
use super::knowledge_index::KnowledgeIndexBuilder;
use crate::error::{Error, Result};
use crate::models::{Depth, OracleAnswer};

const SYSTEM_PROMPT: &str = "You are the oracle of a developer journal. Answer the question using only \
the knowledge index below. Refer to commits by hash, issues by identifier (e.g. ENG-42), and projects \
and repositories by their exact names so the answer can be traced back. If the index does not contain \
the answer, say so plainly.";

#[derive(Clone)]
pub struct OracleService {
    index: KnowledgeIndexBuilder,
    llm: LlmService,
    citations: Arc<CitationExtractor>,
}

impl OracleService {
    pub fn new(index: KnowledgeIndexBuilder, llm: LlmService) -> Self {
        Self {
            index,
            llm,
            citations: Arc::new(CitationExtractor::new()),
        }
    }

    pub fn index_builder(&self) -> &KnowledgeIndexBuilder {
        &self.index
    }

    /// Answer a question and cite the index items the answer names.
    pub async fn ask(
        &self,
        question: &str,
        repository: Option<&str>,
        depth: Depth,
    ) -> Result<OracleAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }

        let index = self.index.build(repository).await;
        let context = self.index.render(&index, depth);

        let request = GenerateRequest::new(format!("{}\n\n{}", SYSTEM_PROMPT, context), question)
            .max_tokens(1200)
            .temperature(0.3);

        let answer = self.llm.generate(&request).await?;
        let sources = self.citations.extract_sources(&answer, &index);

        info!(
            repository = ?index.repository,
            depth = depth.as_str(),
            sources = sources.len(),
            "Oracle answered"
        );

        Ok(OracleAnswer {
            answer,
            sources,
            depth_used: depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::db::{create_journal_entry, init_pool, initialize_schema, CreateJournalEntry};
    use devjournal_llm::ProviderConfig;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_ask_cites_commit_from_index() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        create_journal_entry(
            &pool,
            CreateJournalEntry {
                id: "e1".into(),
                repository: "atlas".into(),
                commit_hash: Some("0123456789abcdef".into()),
                title: Some("Add retries".into()),
                content: "Added retries to the fetcher".into(),
                created_at: "2024-01-01T00:00:00.000Z".into(),
            },
        )
        .await
        .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("commit 0123456789abcdef"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "Retries landed in 0123456 twice: 0123456." } }]
            })))
            .mount(&server)
            .await;

        let mut provider = ProviderConfig::with_defaults("openai", "k", 1);
        provider.base_url = server.uri();
        let oracle = OracleService::new(
            KnowledgeIndexBuilder::new(pool, None, IndexConfig::default()),
            LlmService::new(vec![provider]).unwrap(),
        );

        let answer = oracle.ask("What changed?", Some("atlas"), Depth::Deep).await.unwrap();
        assert_eq!(answer.depth_used, Depth::Deep);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].identifier, "0123456789abcdef");
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let pool = init_pool(":memory:").await.unwrap();
        let oracle = OracleService::new(
            KnowledgeIndexBuilder::new(pool, None, IndexConfig::default()),
            LlmService::new(vec![]).unwrap(),
        );
        assert!(matches!(
            oracle.ask("  ", None, Depth::Quick).await,
            Err(Error::Validation(_))
        ));
    }
}
