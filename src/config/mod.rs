pub mod schema;

pub use schema::{Config, ExtractorConfig, MemoryConfig, ObservabilityConfig, ReconcileConfig};
