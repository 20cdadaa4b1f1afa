use crate::memory::extractor::strip_code_fence;
use crate::providers::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Tags a memory with topical categories ("personal", "food", ...).
#[async_trait]
pub trait Categorizer: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase, trimmed, deduplicated category names for `text`.
    async fn categorize(&self, text: &str) -> anyhow::Result<Vec<String>>;
}

/// Leaves memories untagged.
pub struct NoopCategorizer;

#[async_trait]
impl Categorizer for NoopCategorizer {
    fn name(&self) -> &str {
        "none"
    }

    async fn categorize(&self, _text: &str) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

const CATEGORIZATION_PROMPT: &str = "\
You label a single fact remembered about a user with one or more short topical categories.
Prefer broad, reusable labels such as personal, relationships, preferences, health, \
travel, work, education, food, finance, hobbies, location.
Invent a new label only when none of these fit.
Return JSON only, shaped as {\"categories\": [\"...\"]}.";

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    categories: Vec<String>,
}

pub struct LlmCategorizer {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmCategorizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

pub(crate) fn parse_categories(raw: &str) -> anyhow::Result<Vec<String>> {
    let payload: CategoryPayload = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| anyhow::anyhow!("categorizer reply is malformed: {e}"))?;
    let mut categories: Vec<String> = payload
        .categories
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    categories.sort();
    categories.dedup();
    Ok(categories)
}

#[async_trait]
impl Categorizer for LlmCategorizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn categorize(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let raw = self
            .provider
            .chat_with_system(Some(CATEGORIZATION_PROMPT), text, &self.model, 0.0)
            .await?;
        parse_categories(&raw)
    }
}
