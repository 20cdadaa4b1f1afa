use async_trait::async_trait;

use super::memory_harness::{FailingEmbedder, FailingExtractor, FailingNegation, harness};
use memoria::MemoryError;
use memoria::memory::MetadataStore;
use memoria::memory::embeddings::EmbeddingProvider;
use memoria::memory::types::MemoryAction;

/// Always returns one vector fewer than asked for.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    fn name(&self) -> &str {
        "short"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Claims 4 dimensions but answers with 3.
struct NarrowEmbedder;

#[async_trait]
impl EmbeddingProvider for NarrowEmbedder {
    fn name(&self) -> &str {
        "narrow"
    }

    fn dimensions(&self) -> usize {
        4
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

#[tokio::test]
async fn extractor_failure_writes_nothing() {
    let h = harness().extractor(FailingExtractor).build().await;

    let err = h.engine.reconcile("alice", "My name is John.").await.unwrap_err();

    assert!(matches!(err, MemoryError::ExtractionFailed(ref m) if m.contains("timed out")));
    assert_eq!(h.embedder.calls(), 0);
    assert!(h.engine.owners().await.unwrap().is_empty());
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let h = harness().embedder(FailingEmbedder).build().await;

    let err = h
        .engine
        .reconcile("alice", "My name is John. I love sushi.")
        .await
        .unwrap_err();

    assert!(matches!(err, MemoryError::EmbeddingFailed(ref m) if m.contains("503")));
    assert!(h.engine.owners().await.unwrap().is_empty());
}

#[tokio::test]
async fn short_embedding_batch_is_rejected_before_any_write() {
    let h = harness().embedder(ShortEmbedder).build().await;

    let err = h
        .engine
        .reconcile("alice", "My name is John. I love sushi.")
        .await
        .unwrap_err();

    assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
    assert!(h.live_texts("alice").await.is_empty());
}

#[tokio::test]
async fn wrong_vector_width_is_rejected_before_any_write() {
    let h = harness().embedder(NarrowEmbedder).build().await;

    let err = h.engine.reconcile("alice", "My name is John.").await.unwrap_err();

    assert!(matches!(err, MemoryError::EmbeddingFailed(ref m) if m.contains("expected 4")));
    assert!(h.engine.owners().await.unwrap().is_empty());
}

#[tokio::test]
async fn retraction_check_failure_on_first_candidate_writes_nothing() {
    let h = harness().negation(FailingNegation).build().await;
    let seeded = h.engine.reconcile("alice", "My name is John.").await.unwrap();
    let id = seeded.added[0].clone();
    let before = h.metadata.get(&id).await.unwrap().unwrap();

    let err = h
        .engine
        .reconcile("alice", "My name is Jonathan.")
        .await
        .unwrap_err();

    assert!(matches!(err, MemoryError::RetractionCheckFailed(ref m) if m.contains("502")));
    assert!(err.partial_change_set().is_none());
    assert_eq!(h.metadata.get(&id).await.unwrap().unwrap(), before);
    assert_eq!(h.live_texts("alice").await, vec!["My name is John"]);
}

#[tokio::test]
async fn retraction_check_failure_mid_utterance_reports_committed_work() {
    let h = harness().negation(FailingNegation).build().await;

    let err = h
        .engine
        .reconcile("alice", "My name is John. My name is Jonathan. I love sushi.")
        .await
        .unwrap_err();

    let MemoryError::Interrupted {
        completed,
        abandoned,
        cause,
    } = &err
    else {
        panic!("expected Interrupted, got {err:?}");
    };
    assert!(matches!(**cause, MemoryError::RetractionCheckFailed(_)));
    assert_eq!(*abandoned, 1);
    assert_eq!(completed.outcomes.len(), 1);
    assert_eq!(completed.outcomes[0].action, MemoryAction::Add);
    assert!(!err.is_inconsistency());

    assert_eq!(h.live_texts("alice").await, vec!["My name is John"]);
    assert_eq!(
        h.engine.list_active("alice").await.unwrap()[0].id,
        completed.added[0]
    );
    h.assert_consistent("alice").await;
}
