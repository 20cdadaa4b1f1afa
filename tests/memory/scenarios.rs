use super::memory_harness::{FailingCategorizer, FixedExtractor, TopicCategorizer, harness};
use memoria::MemoryError;
use memoria::memory::types::{MemoryAction, MemoryState};
use memoria::memory::{MetadataStore, VectorIndex};

const ALICE: &str = "alice";

#[tokio::test]
async fn utterance_without_facts_changes_nothing() {
    let h = harness().build().await;

    let changes = h.engine.reconcile(ALICE, "test").await.unwrap();

    assert!(changes.is_empty());
    assert!(h.live_texts(ALICE).await.is_empty());
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn repeated_utterance_adds_once_then_noops() {
    let h = harness().build().await;

    let first = h.engine.reconcile(ALICE, "My name is John.").await.unwrap();
    assert_eq!(first.added.len(), 1);
    assert_eq!(first.outcomes[0].fact, "My name is John");
    assert_eq!(first.outcomes[0].score, None);

    let second = h.engine.reconcile(ALICE, "My name is John.").await.unwrap();
    assert_eq!(second.mutation_count(), 0);
    assert_eq!(second.noop, first.added);
    assert_eq!(second.outcomes[0].action, MemoryAction::Noop);

    assert_eq!(h.live_texts(ALICE).await, vec!["My name is John"]);
    h.assert_consistent(ALICE).await;
}

#[tokio::test]
async fn refinement_updates_in_place() {
    let h = harness().build().await;

    let added = h.engine.reconcile(ALICE, "My name is John.").await.unwrap();
    let id = added.added[0].clone();

    let refined = h
        .engine
        .reconcile_with_source(ALICE, "Actually, my name is Jonathan.", "session-2")
        .await
        .unwrap();
    assert_eq!(refined.updated, vec![id.clone()]);
    let score = refined.outcomes[0].score.unwrap();
    assert!((0.85..0.95).contains(&score), "score {score}");

    let record = h.metadata.get(&id).await.unwrap().unwrap();
    assert_eq!(record.text, "My name is Jonathan");
    assert_eq!(record.state, MemoryState::Updated);
    assert_eq!(record.source, "session-2");
    assert!(record.updated_at >= record.created_at);

    let history = h.metadata.status_history(&id).await.unwrap();
    let states: Vec<MemoryState> = history.iter().map(|c| c.new_state).collect();
    assert_eq!(
        states,
        vec![MemoryState::Pending, MemoryState::Active, MemoryState::Updated]
    );

    assert_eq!(h.live_texts(ALICE).await, vec!["My name is Jonathan"]);
    h.assert_consistent(ALICE).await;
}

#[tokio::test]
async fn retraction_deletes_and_new_fact_is_added() {
    let h = harness().build().await;

    let seeded = h.engine.reconcile(ALICE, "I live in Boston.").await.unwrap();
    let boston = seeded.added[0].clone();

    let changes = h
        .engine
        .reconcile(ALICE, "I used to live in Boston but now I live in Seattle.")
        .await
        .unwrap();

    assert_eq!(changes.deleted, vec![boston.clone()]);
    assert_eq!(changes.added.len(), 1);
    let actions: Vec<MemoryAction> = changes.outcomes.iter().map(|o| o.action).collect();
    assert_eq!(actions, vec![MemoryAction::Delete, MemoryAction::Add]);

    let tombstone = h.metadata.get(&boston).await.unwrap().unwrap();
    assert_eq!(tombstone.state, MemoryState::Deleted);
    assert_eq!(tombstone.text, "I live in Boston");

    assert_eq!(h.live_texts(ALICE).await, vec!["Now I live in Seattle"]);
    h.assert_consistent(ALICE).await;
}

#[tokio::test]
async fn retraction_without_similar_memory_is_added() {
    let h = harness().build().await;
    h.engine.reconcile(ALICE, "My name is John.").await.unwrap();

    let changes = h.engine.reconcile(ALICE, "I don't eat meat.").await.unwrap();

    assert_eq!(changes.added.len(), 1);
    assert_eq!(
        h.live_texts(ALICE).await,
        vec!["I don't eat meat", "My name is John"]
    );
}

#[tokio::test]
async fn near_duplicate_is_noop() {
    let h = harness().build().await;
    let first = h
        .engine
        .reconcile_with_source(ALICE, "I love sushi.", "session-1")
        .await
        .unwrap();
    let id = first.added[0].clone();
    let row_before = h.metadata.get(&id).await.unwrap().unwrap();
    let history_before = h.metadata.status_history(&id).await.unwrap();
    let entry_before = h.index.entry(&id).unwrap();

    let again = h
        .engine
        .reconcile_with_source(ALICE, "I really love sushi.", "session-2")
        .await
        .unwrap();

    assert_eq!(again.noop, vec![id.clone()]);
    assert_eq!(again.mutation_count(), 0);

    let row_after = h.metadata.get(&id).await.unwrap().unwrap();
    assert_eq!(row_after, row_before);
    assert_eq!(row_after.source, "session-1");
    assert_eq!(row_after.updated_at, row_before.updated_at);
    assert_eq!(h.metadata.status_history(&id).await.unwrap(), history_before);
    assert_eq!(h.index.entry(&id), Some(entry_before));
    assert_eq!(h.live_texts(ALICE).await, vec!["I love sushi"]);
}

#[tokio::test]
async fn owners_never_see_each_other() {
    let h = harness().build().await;

    let alice = h.engine.reconcile(ALICE, "My name is John.").await.unwrap();
    let bob = h.engine.reconcile("bob", "My name is John.").await.unwrap();

    assert_eq!(alice.added.len(), 1);
    assert_eq!(bob.added.len(), 1);
    assert_ne!(alice.added, bob.added);

    let found = h.engine.query("bob", "My name is John", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].memory.owner, "bob");

    h.engine.forget_all(ALICE).await.unwrap();
    assert!(h.live_texts(ALICE).await.is_empty());
    assert_eq!(h.live_texts("bob").await, vec!["My name is John"]);
    h.assert_consistent("bob").await;
}

#[tokio::test]
async fn query_ranks_live_memories() {
    let h = harness()
        .extractor(FixedExtractor(vec![
            "My name is John".into(),
            "I live in Boston".into(),
            "I love sushi".into(),
        ]))
        .build()
        .await;
    h.engine.reconcile(ALICE, "ignored").await.unwrap();

    let found = h.engine.query(ALICE, "My name is Jonathan", 2).await.unwrap();

    assert!(found.len() <= 2);
    assert_eq!(found[0].memory.text, "My name is John");
    assert!(found.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(h.engine.query(ALICE, "   ", 5).await.unwrap().is_empty());
    assert!(h.engine.query(ALICE, "I love sushi", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_returns_only_live_memories() {
    let h = harness().build().await;
    h.engine.reconcile(ALICE, "I live in Boston.").await.unwrap();
    h.engine.reconcile(ALICE, "I love sushi.").await.unwrap();
    h.engine
        .reconcile(ALICE, "I used to live in Boston.")
        .await
        .unwrap();

    let listed = h.engine.list_active(ALICE).await.unwrap();

    let texts: Vec<&str> = listed.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["I love sushi"]);
    assert!(listed.iter().all(|r| r.state.is_live()));
}

#[tokio::test]
async fn forget_tombstones_one_memory() {
    let h = harness().build().await;
    let changes = h
        .engine
        .reconcile(ALICE, "My name is John. I love sushi.")
        .await
        .unwrap();
    let john = changes.added[0].clone();

    let tomb = h.engine.forget(ALICE, &john).await.unwrap();
    assert_eq!(tomb.state, MemoryState::Deleted);
    assert_eq!(tomb.source, "forget");
    assert_eq!(h.live_texts(ALICE).await, vec!["I love sushi"]);
    h.assert_consistent(ALICE).await;

    let again = h.engine.forget(ALICE, &john).await.unwrap_err();
    assert!(matches!(again, MemoryError::NotFound(id) if id == john));
}

#[tokio::test]
async fn forget_rejects_foreign_and_unknown_ids() {
    let h = harness().build().await;
    let changes = h.engine.reconcile(ALICE, "My name is John.").await.unwrap();
    let id = changes.added[0].clone();

    let foreign = h.engine.forget("bob", &id).await.unwrap_err();
    assert!(matches!(foreign, MemoryError::NotFound(_)));
    let unknown = h.engine.forget(ALICE, "no-such-id").await.unwrap_err();
    assert!(matches!(unknown, MemoryError::NotFound(_)));

    assert_eq!(h.live_texts(ALICE).await, vec!["My name is John"]);
}

#[tokio::test]
async fn forget_all_returns_every_deleted_id() {
    let h = harness().build().await;
    let changes = h
        .engine
        .reconcile(ALICE, "My name is John. I love sushi. I live in Boston.")
        .await
        .unwrap();

    let mut deleted = h.engine.forget_all(ALICE).await.unwrap();
    deleted.sort();
    let mut added = changes.added.clone();
    added.sort();

    assert_eq!(deleted, added);
    assert!(h.index.ids_for_owner(ALICE).await.unwrap().is_empty());
    assert!(h.engine.forget_all(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_owner_is_rejected() {
    let h = harness().build().await;

    let err = h.engine.reconcile("  ", "My name is John.").await.unwrap_err();
    assert!(matches!(err, MemoryError::InvalidInput(_)));
    assert!(matches!(
        h.engine.query("", "John", 3).await.unwrap_err(),
        MemoryError::InvalidInput(_)
    ));
    assert!(matches!(
        h.engine.list_active("").await.unwrap_err(),
        MemoryError::InvalidInput(_)
    ));
}

#[tokio::test]
async fn provenance_is_recorded_per_call() {
    let h = harness().build().await;

    let explicit = h
        .engine
        .reconcile_with_source(ALICE, "My name is John.", "chat:42")
        .await
        .unwrap();
    let generated = h.engine.reconcile(ALICE, "I love sushi.").await.unwrap();

    let john = h.metadata.get(&explicit.added[0]).await.unwrap().unwrap();
    assert_eq!(john.source, "chat:42");
    let sushi = h.metadata.get(&generated.added[0]).await.unwrap().unwrap();
    assert!(sushi.source.starts_with("utterance:"), "{}", sushi.source);
}

#[tokio::test]
async fn owners_and_health_are_reported() {
    let h = harness().build().await;
    h.engine.reconcile("bob", "I love sushi.").await.unwrap();
    h.engine.reconcile(ALICE, "I love sushi.").await.unwrap();

    assert_eq!(h.engine.owners().await.unwrap(), vec!["alice", "bob"]);
    let health = h.engine.health_check().await;
    assert!(health.metadata && health.vector);
}

#[tokio::test]
async fn categories_are_tagged_on_add_and_merged_on_update() {
    let h = harness().categorizer(TopicCategorizer).build().await;

    let added = h.engine.reconcile(ALICE, "My name is John.").await.unwrap();
    let id = added.added[0].clone();
    let john = h.metadata.get(&id).await.unwrap().unwrap();
    assert_eq!(john.categories, vec!["personal"]);

    h.engine
        .reconcile(ALICE, "Actually, my name is Jonathan.")
        .await
        .unwrap();
    let listed = h.engine.list_active(ALICE).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].categories, vec!["personal", "renamed"]);

    let json = serde_json::to_value(&listed[0]).unwrap();
    assert_eq!(json["categories"], serde_json::json!(["personal", "renamed"]));
}

#[tokio::test]
async fn categorizer_failure_keeps_the_memory() {
    let h = harness().categorizer(FailingCategorizer).build().await;

    let changes = h.engine.reconcile(ALICE, "I love sushi.").await.unwrap();

    assert_eq!(changes.added.len(), 1);
    let listed = h.engine.list_active(ALICE).await.unwrap();
    assert!(listed[0].categories.is_empty());
    h.assert_consistent(ALICE).await;
}
