mod core;
mod extractor;
mod memory;
mod observability;
mod reconcile;

pub use core::Config;
pub use extractor::ExtractorConfig;
pub use memory::MemoryConfig;
pub use observability::ObservabilityConfig;
pub use reconcile::ReconcileConfig;
