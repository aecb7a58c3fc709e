//! Application state for devjournal.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use devjournal_llm::LlmService;

use crate::config::{self, Config};
use crate::db::DbPool;
use crate::services::{
    DocumentsClient, KnowledgeIndexBuilder, LinearClient, LinearClientConfig, LlmSummaryGenerator,
    NotesClient, NotesClientConfig, OracleService, Reconciler, SyncService,
};
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Text generation gateway.
    pub llm: LlmService,
    /// Linear and notes sync passes.
    pub sync: SyncService,
    /// Knowledge index and question answering.
    pub oracle: OracleService,
}

impl AppState {
    /// Create the application state from the global configuration.
    pub async fn new() -> Result<Self> {
        let config = config::config();

        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::initialize_schema(&db).await?;

        Self::from_config(db, config)
    }

    /// Wire every service from `config` on top of an initialized pool.
    pub fn from_config(db: DbPool, config: &Config) -> Result<Self> {
        let llm = LlmService::new(config.llm.providers.clone())?;
        if !llm.is_available() {
            tracing::warn!("No LLM providers configured; summaries and oracle answers are disabled");
        }

        let reconciler = Reconciler::new(
            db.clone(),
            Arc::new(LlmSummaryGenerator::new(llm.clone())),
            config.sync.summary_min_content_length,
            config.sync.summary_concurrency,
        );

        let linear = LinearClient::new(LinearClientConfig::from_config(&config.linear))?;
        let notes = NotesClient::new(NotesClientConfig::from_config(&config.notes))?;
        let sync = SyncService::new(db.clone(), linear, notes, reconciler);

        let documents = config
            .documents
            .base_url
            .as_deref()
            .map(DocumentsClient::new)
            .transpose()?;
        let index = KnowledgeIndexBuilder::new(db.clone(), documents, config.index.clone());
        let oracle = OracleService::new(index, llm.clone());

        Ok(Self {
            db,
            llm,
            sync,
            oracle,
        })
    }
}
