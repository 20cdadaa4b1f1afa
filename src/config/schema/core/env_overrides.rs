use super::Config;
use std::path::PathBuf;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) =
            std::env::var("MEMORIA_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
            && !key.is_empty()
        {
            self.api_key = Some(key);
        }

        if let Ok(workspace) = std::env::var("MEMORIA_WORKSPACE")
            && !workspace.is_empty()
        {
            self.workspace_dir = PathBuf::from(shellexpand::tilde(&workspace).into_owned());
        }

        if let Ok(backend) = std::env::var("MEMORIA_VECTOR_BACKEND")
            && !backend.is_empty()
        {
            self.memory.vector_backend = backend;
        }

        if let Ok(provider) = std::env::var("MEMORIA_EMBEDDING_PROVIDER")
            && !provider.is_empty()
        {
            self.memory.embedding_provider = provider;
        }

        if let Ok(level) = std::env::var("MEMORIA_LOG_LEVEL")
            && !level.is_empty()
        {
            self.observability.log_level = level.to_lowercase();
        }
    }
}
