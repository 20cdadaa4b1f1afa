use crate::config::Config;
use crate::providers::{OpenAiProvider, Provider, openai::DEFAULT_OPENAI_BASE_URL};

#[cfg(feature = "vector-search")]
use super::index::LanceDbVectorIndex;
use super::categorizer::{Categorizer, LlmCategorizer, NoopCategorizer};
use super::extractor::{FactExtractor, LlmFactExtractor, SentenceFactExtractor};
use super::index::{InMemoryVectorIndex, SqliteVectorIndex, VectorIndex};
use super::negation::{KeywordNegationDetector, LlmNegationDetector, NegationDetector};
use super::reconcile::{EngineComponents, ReconciliationEngine};
use super::store::MetadataStore;
use super::{SqliteMetadataStore, embeddings};

use std::sync::Arc;

/// Assemble an engine from configuration. Backend choice lives here only.
pub async fn create_engine(config: &Config) -> anyhow::Result<ReconciliationEngine> {
    let memory = &config.memory;
    let api_key = config.api_key.as_deref();

    let metadata = match memory.metadata_backend.as_str() {
        "sqlite" => Arc::new(SqliteMetadataStore::new(&config.workspace_dir).await?),
        "memory" => Arc::new(SqliteMetadataStore::in_memory().await?),
        other => anyhow::bail!("Unknown metadata backend '{other}'. Supported: sqlite, memory"),
    };

    let index: Arc<dyn VectorIndex> = match memory.vector_backend.as_str() {
        "sqlite" => Arc::new(SqliteVectorIndex::new(metadata.pool().clone()).await?),
        "memory" => Arc::new(InMemoryVectorIndex::new()),
        #[cfg(feature = "vector-search")]
        "lancedb" => Arc::new(LanceDbVectorIndex::new(
            &config.workspace_dir,
            memory.embedding_dimensions,
        )?),
        #[cfg(not(feature = "vector-search"))]
        "lancedb" => anyhow::bail!(
            "Vector backend 'lancedb' requires building with the `vector-search` feature"
        ),
        other => {
            anyhow::bail!("Unknown vector backend '{other}'. Supported: sqlite, memory, lancedb")
        }
    };

    let embedder = embeddings::create_embedding_provider(memory, api_key)?;

    let chat: Arc<dyn Provider> = Arc::new(OpenAiProvider::with_base_url(
        config
            .extractor
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL),
        api_key,
    ));

    let extractor: Arc<dyn FactExtractor> = match config.extractor.mode.as_str() {
        "llm" => Arc::new(LlmFactExtractor::new(
            Arc::clone(&chat),
            config.extractor.model.clone(),
            config.extractor.temperature,
        )),
        "sentence" => Arc::new(SentenceFactExtractor),
        other => anyhow::bail!("Unknown extractor mode '{other}'. Supported: llm, sentence"),
    };

    let negation: Arc<dyn NegationDetector> = match config.reconcile.negation.as_str() {
        "keyword" => Arc::new(KeywordNegationDetector),
        "llm" => Arc::new(LlmNegationDetector::new(
            Arc::clone(&chat),
            config.extractor.model.clone(),
        )),
        other => anyhow::bail!("Unknown negation mode '{other}'. Supported: keyword, llm"),
    };

    let categorizer: Arc<dyn Categorizer> = match config.reconcile.categorizer.as_str() {
        "none" => Arc::new(NoopCategorizer),
        "llm" => Arc::new(LlmCategorizer::new(chat, config.extractor.model.clone())),
        other => anyhow::bail!("Unknown categorizer '{other}'. Supported: none, llm"),
    };

    tracing::debug!(
        metadata = metadata.name(),
        vector = index.name(),
        embedder = embedder.name(),
        extractor = extractor.name(),
        negation = negation.name(),
        categorizer = categorizer.name(),
        "memory engine assembled"
    );

    let engine = ReconciliationEngine::new(
        EngineComponents {
            extractor,
            embedder,
            negation,
            categorizer,
            metadata,
            index,
        },
        config.reconcile.engine_settings(),
    );

    if memory.vector_backend == "memory" && memory.metadata_backend == "sqlite" {
        warm_index(&engine).await?;
    }
    Ok(engine)
}

/// A process-local index starts empty while the database keeps its rows.
/// Reload it from stored embeddings so existing memories are found again
/// instead of being added a second time.
async fn warm_index(engine: &ReconciliationEngine) -> anyhow::Result<()> {
    let mut reindexed = 0;
    for owner in engine.owners().await? {
        let report = engine.repair(&owner).await?;
        if !report.skipped.is_empty() {
            tracing::warn!(
                owner = %owner,
                skipped = report.skipped.len(),
                "memories without a stored embedding stay unsearchable"
            );
        }
        reindexed += report.reindexed.len();
    }
    tracing::info!(reindexed, "in-memory vector index rebuilt from metadata");
    Ok(())
}
