use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ObservabilityConfig {
    pub fn level(&self) -> Result<Level, String> {
        Level::from_str(&self.log_level)
            .map_err(|_| format!("unknown observability.log_level '{}'", self.log_level))
    }
}
