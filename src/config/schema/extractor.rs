use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// "llm" | "sentence"
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Chat model used for extraction and the llm negation classifier
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI-compatible endpoint; defaults to api.openai.com
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: f64,
}

fn default_mode() -> String {
    "llm".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            model: default_model(),
            base_url: None,
            temperature: 0.0,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !["llm", "sentence"].contains(&self.mode.as_str()) {
            return Err(format!("unknown extractor.mode '{}'", self.mode));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "extractor.temperature must be within [0, 2], got {}",
                self.temperature
            ));
        }
        if self.model.trim().is_empty() {
            return Err("extractor.model must not be empty".into());
        }
        Ok(())
    }
}
