//! Text generation gateway with multi-provider fallback.
//!
//! Supports Gemini, Anthropic (Claude), OpenRouter, and OpenAI. Every call
//! takes a system prompt and a user prompt; providers are tried in priority
//! order and the next one is used when a provider is rate limited or fails.
//!
//! Credentials live on each [`ProviderConfig`] and are sent with the request
//! that uses them. Nothing here reads or writes process environment.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Maximum retries per provider before fallback
const MAX_RETRIES: u32 = 2;

/// Delay between retries (doubles each time)
const RETRY_DELAY_MS: u64 = 500;

/// Number of consecutive failed calls before the service reports unavailable
const ERROR_THRESHOLD: u32 = 3;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Error types for the generation gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("No providers configured")]
    NoProviders,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Response did not match the expected structure: {0}")]
    Structure(String),
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One configured provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub priority: u8,
}

impl ProviderConfig {
    /// Build a provider with the default endpoint and model for `name`.
    pub fn with_defaults(name: &str, api_key: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            base_url: default_endpoint(name),
            model: default_model(name),
            api_key: api_key.into(),
            priority,
        }
    }
}

/// A generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.3,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Get default endpoint for a provider
pub fn default_endpoint(name: &str) -> String {
    match name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "anthropic" => "https://api.anthropic.com/v1".to_string(),
        "openrouter" => "https://openrouter.ai/api/v1".to_string(),
        _ => "https://api.openai.com/v1".to_string(),
    }
}

/// Get default model for a provider
pub fn default_model(name: &str) -> String {
    match name {
        "gemini" => "gemini-1.5-flash".to_string(),
        "anthropic" => "claude-3-5-haiku-20241022".to_string(),
        "openrouter" => "meta-llama/llama-3-8b-instruct:free".to_string(),
        _ => "gpt-4o-mini".to_string(),
    }
}

/// Generation service with multi-provider fallback.
#[derive(Clone)]
pub struct LlmService {
    inner: Arc<LlmServiceInner>,
}

struct LlmServiceInner {
    providers: Vec<ProviderConfig>,
    client: Client,
    last_error: RwLock<Option<String>>,
    /// Consecutive failed calls
    error_count: AtomicU32,
}

/// Response from a provider API
#[derive(Debug, Deserialize)]
struct LlmResponse {
    choices: Option<Vec<Choice>>,
    candidates: Option<Vec<Candidate>>,     // Gemini format
    content: Option<Vec<AnthropicContent>>, // Anthropic format
    error: Option<LlmError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Debug, Deserialize)]
struct LlmError {
    message: String,
}

impl LlmService {
    /// Create the service. Providers are sorted by priority (lowest first).
    pub fn new(mut providers: Vec<ProviderConfig>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Request(format!("Failed to create HTTP client: {}", e)))?;

        providers.sort_by_key(|p| p.priority);

        info!(
            providers = ?providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
            "LLM service initialized"
        );

        Ok(Self {
            inner: Arc::new(LlmServiceInner {
                providers,
                client,
                last_error: RwLock::new(None),
                error_count: AtomicU32::new(0),
            }),
        })
    }

    /// True when at least one provider is configured and recent calls have
    /// not failed repeatedly.
    pub fn is_available(&self) -> bool {
        !self.inner.providers.is_empty()
            && self.inner.error_count.load(Ordering::Relaxed) < ERROR_THRESHOLD
    }

    /// Last error message and consecutive error count, if any.
    pub async fn error_info(&self) -> Option<(String, u32)> {
        let error = self.inner.last_error.read().await;
        error
            .as_ref()
            .map(|msg| (msg.clone(), self.inner.error_count.load(Ordering::Relaxed)))
    }

    /// Provider names in priority order
    pub fn providers(&self) -> Vec<String> {
        self.inner.providers.iter().map(|p| p.name.clone()).collect()
    }

    async fn record_error(&self, error: &str) {
        *self.inner.last_error.write().await = Some(error.to_string());
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn clear_error(&self) {
        *self.inner.last_error.write().await = None;
        self.inner.error_count.store(0, Ordering::Relaxed);
    }

    /// Generate text with automatic provider fallback.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        if self.inner.providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let mut last_error = None;

        for provider in &self.inner.providers {
            if provider.api_key.is_empty() {
                debug!(provider = %provider.name, "Skipping provider without credentials");
                continue;
            }

            match self.try_provider(provider, request).await {
                Ok(response) => {
                    self.clear_error().await;
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        let error_msg = last_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "All providers failed".to_string());
        self.record_error(&error_msg).await;

        Err(last_error.unwrap_or(Error::Llm("All providers failed".to_string())))
    }

    /// Generate a response that must contain a JSON object and return it.
    pub async fn generate_json(&self, request: &GenerateRequest) -> Result<Value> {
        let text = self.generate(request).await?;
        extract_json(&text).ok_or_else(|| {
            Error::Structure(format!(
                "no JSON object in response: {}",
                text.chars().take(120).collect::<String>()
            ))
        })
    }

    async fn try_provider(
        &self,
        provider: &ProviderConfig,
        request: &GenerateRequest,
    ) -> Result<String> {
        let mut delay = Duration::from_millis(RETRY_DELAY_MS);

        for attempt in 0..MAX_RETRIES {
            match self.call_provider(provider, request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if is_retryable(&e) && attempt < MAX_RETRIES - 1 {
                        debug!(
                            provider = %provider.name,
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Retrying after error"
                        );
                        sleep(delay).await;
                        delay *= 2;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(Error::Llm(format!(
            "Provider {} failed after {} retries",
            provider.name, MAX_RETRIES
        )))
    }

    async fn call_provider(
        &self,
        provider: &ProviderConfig,
        request: &GenerateRequest,
    ) -> Result<String> {
        debug!(
            provider = %provider.name,
            model = %provider.model,
            "Calling LLM provider"
        );

        let (url, body) = match provider.name.as_str() {
            "gemini" => build_gemini_request(provider, request),
            "anthropic" => build_anthropic_request(provider, request),
            _ => build_openai_request(provider, request),
        };

        let builder = self
            .inner
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        let builder = match provider.name.as_str() {
            // Gemini carries the key in the query string.
            "gemini" => builder,
            "anthropic" => builder
                .header("x-api-key", &provider.api_key)
                .header("anthropic-version", "2023-06-01"),
            _ => builder.header("Authorization", format!("Bearer {}", provider.api_key)),
        };

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Request(format!("Failed to read response: {}", e)))?;

        if status.as_u16() == 429 {
            return Err(Error::RateLimitExceeded);
        }

        if !status.is_success() {
            return Err(Error::Llm(format!("Provider returned {}: {}", status, text)));
        }

        parse_response(&provider.name, &text)
    }
}

fn is_retryable(error: &Error) -> bool {
    matches!(error, Error::RateLimitExceeded)
        || error.to_string().contains("503")
        || error.to_string().contains("timeout")
}

fn build_gemini_request(provider: &ProviderConfig, request: &GenerateRequest) -> (String, Value) {
    let url = format!(
        "{}/models/{}:generateContent?key={}",
        provider.base_url, provider.model, provider.api_key
    );

    let body = json!({
        "systemInstruction": {
            "parts": [{"text": request.system}]
        },
        "contents": [{
            "role": "user",
            "parts": [{"text": request.prompt}]
        }],
        "generationConfig": {
            "maxOutputTokens": request.max_tokens,
            "temperature": request.temperature
        }
    });

    (url, body)
}

/// OpenAI-compatible APIs (OpenAI, OpenRouter)
fn build_openai_request(provider: &ProviderConfig, request: &GenerateRequest) -> (String, Value) {
    let url = format!("{}/chat/completions", provider.base_url);

    let body = json!({
        "model": provider.model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.prompt}
        ],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature
    });

    (url, body)
}

fn build_anthropic_request(
    provider: &ProviderConfig,
    request: &GenerateRequest,
) -> (String, Value) {
    let url = format!("{}/messages", provider.base_url);

    let body = json!({
        "model": provider.model,
        "system": request.system,
        "messages": [
            {"role": "user", "content": request.prompt}
        ],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature
    });

    (url, body)
}

fn parse_response(provider: &str, text: &str) -> Result<String> {
    let response: LlmResponse = serde_json::from_str(text)
        .map_err(|e| Error::Llm(format!("Failed to parse response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(Error::Llm(error.message));
    }

    if let Some(block) = response.content.as_ref().and_then(|c| c.first()) {
        return Ok(block.text.clone());
    }

    if let Some(part) = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.content.parts.first())
    {
        return Ok(part.text.clone());
    }

    if let Some(choice) = response.choices.as_ref().and_then(|c| c.first()) {
        if let Some(message) = &choice.message {
            return Ok(message.content.clone());
        }
        if let Some(text) = &choice.text {
            return Ok(text.clone());
        }
    }

    Err(Error::Llm(format!("No content in {} response", provider)))
}

/// Extract the first JSON object from model output.
///
/// Looks in ```json fences, then generic fences, then for the first balanced
/// `{ ... }` in the raw text.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            if let Ok(json) = serde_json::from_str(&text[start..start + end]) {
                return Some(json);
            }
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            if let Ok(json) = serde_json::from_str(&text[start..start + end]) {
                return Some(json);
            }
        }
    }

    if let Some(start) = text.find('{') {
        let mut depth = 0;
        let mut end = start;
        for (i, c) in text[start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        if end > start {
            if let Ok(json) = serde_json::from_str(&text[start..end]) {
                return Some(json);
            }
        }
    }

    None
}
