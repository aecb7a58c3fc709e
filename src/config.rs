//! Configuration management for devjournal.
//!
//! Loads configuration from environment variables (with `.env` support):
//! - Server and database settings
//! - Linear, notes and documents service endpoints and credentials
//! - LLM providers with fallback priority
//! - Sync and knowledge index limits

use std::env;
use std::sync::OnceLock;

use devjournal_llm::ProviderConfig;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub linear: RemoteServiceConfig,
    pub notes: RemoteServiceConfig,
    pub documents: DocumentsConfig,
    pub llm: LlmConfig,
    pub sync: SyncConfig,
    pub index: IndexConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
        }
    }
}

/// Endpoint and credentials for one external work-tracking service.
#[derive(Debug, Clone, Default)]
pub struct RemoteServiceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentsConfig {
    /// Unset disables the documents slice of the knowledge index.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Content shorter than this never gets a generated summary.
    pub summary_min_content_length: usize,
    /// Summary calls in flight at once during one pass.
    pub summary_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            summary_min_content_length: 100,
            summary_concurrency: 4,
        }
    }
}

/// Per-slice caps for the knowledge index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub project_summaries: i64,
    pub journal_entries: i64,
    pub recent_repositories: i64,
    pub entries_per_repository: i64,
    pub issues: i64,
    pub projects: i64,
    pub notes: i64,
    pub documents: u32,
    pub attachment_entries: usize,
    /// Characters of body text rendered per item in quick mode.
    pub snippet_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            project_summaries: 10,
            journal_entries: 20,
            recent_repositories: 5,
            entries_per_repository: 5,
            issues: 30,
            projects: 15,
            notes: 10,
            documents: 10,
            attachment_entries: 5,
            snippet_chars: 280,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let index_defaults = IndexConfig::default();
        let sync_defaults = SyncConfig::default();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "127.0.0.1"),
                port: env_parse("PORT", 8787),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/devjournal.db"),
            },
            linear: RemoteServiceConfig {
                base_url: env_or("LINEAR_API_URL", "https://api.linear.app/graphql"),
                api_key: env::var("LINEAR_API_KEY").ok(),
                page_size: env_parse("LINEAR_PAGE_SIZE", 50),
            },
            notes: RemoteServiceConfig {
                base_url: env_or("NOTES_API_URL", "http://localhost:8790"),
                api_key: env::var("NOTES_API_KEY").ok(),
                page_size: env_parse("NOTES_PAGE_SIZE", 50),
            },
            documents: DocumentsConfig {
                base_url: env::var("DOCUMENTS_API_URL").ok(),
            },
            llm: LlmConfig {
                providers: Self::parse_llm_providers(),
            },
            sync: SyncConfig {
                summary_min_content_length: env_parse(
                    "SUMMARY_MIN_CONTENT_LENGTH",
                    sync_defaults.summary_min_content_length,
                ),
                summary_concurrency: env_parse(
                    "SUMMARY_CONCURRENCY",
                    sync_defaults.summary_concurrency,
                )
                .max(1),
            },
            index: IndexConfig {
                project_summaries: env_cap(
                    "INDEX_PROJECT_SUMMARIES",
                    index_defaults.project_summaries,
                ),
                journal_entries: env_cap("INDEX_JOURNAL_ENTRIES", index_defaults.journal_entries),
                issues: env_cap("INDEX_ISSUES", index_defaults.issues),
                projects: env_cap("INDEX_PROJECTS", index_defaults.projects),
                notes: env_cap("INDEX_NOTES", index_defaults.notes),
                documents: env_parse("INDEX_DOCUMENTS", index_defaults.documents),
                ..index_defaults
            },
        }
    }

    /// Parse LLM providers from environment.
    /// Supports Gemini, Anthropic, OpenRouter, and OpenAI with automatic fallback ordering.
    fn parse_llm_providers() -> Vec<ProviderConfig> {
        let candidates = [
            ("gemini", "GOOGLE_API_KEY", "GEMINI_MODEL", 1),
            ("anthropic", "ANTHROPIC_API_KEY", "ANTHROPIC_MODEL", 2),
            ("openrouter", "OPENROUTER_API_KEY", "OPENROUTER_MODEL", 3),
            ("openai", "OPENAI_API_KEY", "OPENAI_MODEL", 4),
        ];

        let mut providers: Vec<ProviderConfig> = candidates
            .iter()
            .filter_map(|(name, key_var, model_var, priority)| {
                let api_key = env::var(key_var).ok()?;
                let mut provider = ProviderConfig::with_defaults(name, api_key, *priority);
                if let Ok(model) = env::var(model_var) {
                    provider.model = model;
                }
                Some(provider)
            })
            .collect();

        // OpenAI-compatible endpoint override (local gateways, proxies)
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            for provider in providers.iter_mut().filter(|p| p.name == "openai") {
                provider.base_url = base_url.clone();
            }
        }

        providers.sort_by_key(|p| p.priority);
        providers
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Row cap for a SQL `LIMIT`. Negative values would mean "no limit" to
/// SQLite, so they clamp to zero.
fn env_cap(key: &str, default: i64) -> i64 {
    env_parse(key, default).max(0)
}
