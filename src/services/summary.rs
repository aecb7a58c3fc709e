//! Summary generator gateway.
//!
//! Turns a cached item's text into a short index summary. Callers treat
//! every failure as recoverable: the item is stored without a summary and
//! a later pass tries again.

use async_trait::async_trait;
use devjournal_llm::{GenerateRequest, LlmService};

use crate::error::{Error, Result};
use crate::models::SummaryInput;

/// Characters of content sent to the model.
const MAX_CONTENT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You write index summaries for a developer journal. \
Summaries are read by another assistant that decides which items are relevant to a question, \
so pack names, components and outcomes into few words. No fluff.";

/// Something that can produce a summary for a cached item.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn summarize(&self, input: &SummaryInput) -> Result<String>;
}

/// Summary generator backed by the LLM gateway.
#[derive(Clone)]
pub struct LlmSummaryGenerator {
    llm: LlmService,
}

impl LlmSummaryGenerator {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    fn build_prompt(input: &SummaryInput) -> String {
        let content: String = input.content.chars().take(MAX_CONTENT_CHARS).collect();
        format!(
            r#"Summarize this {kind} in exactly three sentences.

Title: {title}

```
{content}
```

Return JSON: {{"summary": "<three sentences>"}}
ONLY valid JSON, no markdown."#,
            kind = input.kind.as_str(),
            title = input.title.as_deref().unwrap_or("(untitled)"),
            content = content,
        )
    }
}

#[async_trait]
impl SummaryGenerator for LlmSummaryGenerator {
    async fn summarize(&self, input: &SummaryInput) -> Result<String> {
        let request = GenerateRequest::new(SYSTEM_PROMPT, Self::build_prompt(input))
            .max_tokens(300)
            .temperature(0.2);

        let json = self.llm.generate_json(&request).await?;

        json["summary"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| Error::Llm("Response has no summary field".to_string()))
    }
}
