use super::super::{ExtractorConfig, MemoryConfig, ObservabilityConfig, ReconcileConfig};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Key for the OpenAI-compatible embedding and chat endpoints
    pub api_key: Option<String>,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("."),
            config_path: PathBuf::from("config.toml"),
            api_key: None,
            memory: MemoryConfig::default(),
            reconcile: ReconcileConfig::default(),
            extractor: ExtractorConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.memory.validate().map_err(ConfigError::Validation)?;
        self.reconcile.validate().map_err(ConfigError::Validation)?;
        self.extractor.validate().map_err(ConfigError::Validation)?;
        self.observability
            .level()
            .map_err(ConfigError::Validation)?;
        Ok(())
    }
}
