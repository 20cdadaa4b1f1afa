pub mod categorizer;
pub mod embeddings;
pub mod extractor;
pub mod factory;
pub mod index;
pub mod locks;
pub mod negation;
pub mod policy;
pub mod reconcile;
pub mod repair;
pub mod search;
pub mod sqlite;
pub mod store;
pub mod transaction;
pub mod types;
pub mod vector;

pub use categorizer::{Categorizer, LlmCategorizer, NoopCategorizer};
pub use embeddings::EmbeddingProvider;
pub use extractor::{FactExtractor, LlmFactExtractor, SentenceFactExtractor};
pub use factory::create_engine;
pub use index::{InMemoryVectorIndex, SqliteVectorIndex, VectorIndex};
pub use negation::{KeywordNegationDetector, LlmNegationDetector, NegationDetector};
pub use policy::DecisionPolicy;
pub use reconcile::{EngineComponents, EngineSettings, ReconciliationEngine, StoreHealth};
pub use repair::{ConsistencyReport, RepairReport};
pub use sqlite::SqliteMetadataStore;
pub use store::MetadataStore;
pub use types::{
    CandidateOutcome, MemoryAction, MemoryChangeSet, MemoryRecord, MemoryState, ScoredMemory,
};
