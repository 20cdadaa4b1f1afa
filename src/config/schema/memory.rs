use serde::{Deserialize, Serialize};

pub(crate) const VECTOR_BACKENDS: [&str; 3] = ["sqlite", "memory", "lancedb"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite" (file under the workspace) | "memory" (ephemeral)
    #[serde(default = "default_metadata_backend")]
    pub metadata_backend: String,
    /// "sqlite" | "memory" | "lancedb"
    #[serde(default = "default_vector_backend")]
    pub vector_backend: String,
    /// Embedding provider: "none" | "openai" | "custom:URL"
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    /// Embedding model name (e.g. "text-embedding-3-small")
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Embedding vector dimensions
    #[serde(default = "default_embedding_dims")]
    pub embedding_dimensions: usize,
}

fn default_metadata_backend() -> String {
    "sqlite".into()
}
fn default_vector_backend() -> String {
    "sqlite".into()
}
fn default_embedding_provider() -> String {
    "openai".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dims() -> usize {
    1536
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            metadata_backend: default_metadata_backend(),
            vector_backend: default_vector_backend(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dims(),
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !["sqlite", "memory"].contains(&self.metadata_backend.as_str()) {
            return Err(format!(
                "unknown memory.metadata_backend '{}'",
                self.metadata_backend
            ));
        }
        if !VECTOR_BACKENDS.contains(&self.vector_backend.as_str()) {
            return Err(format!(
                "unknown memory.vector_backend '{}' (expected one of {})",
                self.vector_backend,
                VECTOR_BACKENDS.join(", ")
            ));
        }
        let provider = self.embedding_provider.as_str();
        if !(provider == "none" || provider == "openai" || provider.starts_with("custom:")) {
            return Err(format!("unknown memory.embedding_provider '{provider}'"));
        }
        if provider != "none" && self.embedding_dimensions == 0 {
            return Err("memory.embedding_dimensions must be > 0".into());
        }
        Ok(())
    }
}
