use crate::error::MemoryError;
use crate::memory::categorizer::Categorizer;
use crate::memory::embeddings::EmbeddingProvider;
use crate::memory::extractor::{CandidateLimits, FactExtractor, validate_candidates};
use crate::memory::index::VectorIndex;
use crate::memory::locks::OwnerLocks;
use crate::memory::negation::NegationDetector;
use crate::memory::policy::{BestMatch, DecisionPolicy};
use crate::memory::repair::{ConsistencyChecker, ConsistencyReport, RepairReport};
use crate::memory::search::SimilaritySearch;
use crate::memory::store::MetadataStore;
use crate::memory::transaction::DualStoreWriter;
use crate::memory::types::{
    AccessKind, CandidateOutcome, MemoryAction, MemoryChangeSet, MemoryMutation, MemoryRecord,
    MemoryUpdate, ScoredMemory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub top_k: usize,
    pub policy: DecisionPolicy,
    pub limits: CandidateLimits,
    pub deadline: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            policy: DecisionPolicy::default(),
            limits: CandidateLimits::default(),
            deadline: Duration::from_millis(30_000),
        }
    }
}

/// Collaborators the engine is assembled from.
pub struct EngineComponents {
    pub extractor: Arc<dyn FactExtractor>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub negation: Arc<dyn NegationDetector>,
    pub categorizer: Arc<dyn Categorizer>,
    pub metadata: Arc<dyn MetadataStore>,
    pub index: Arc<dyn VectorIndex>,
}

/// Health of both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreHealth {
    pub metadata: bool,
    pub vector: bool,
}

/// Turns utterances into add / update / delete / no-op decisions and commits
/// them across the metadata store and the vector index.
///
/// Calls for the same owner may run concurrently; each candidate's lookup,
/// decision and write happen under that owner's lock.
pub struct ReconciliationEngine {
    extractor: Arc<dyn FactExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    negation: Arc<dyn NegationDetector>,
    categorizer: Arc<dyn Categorizer>,
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn VectorIndex>,
    search: SimilaritySearch,
    writer: DualStoreWriter,
    checker: ConsistencyChecker,
    locks: OwnerLocks,
    settings: EngineSettings,
}

impl ReconciliationEngine {
    pub fn new(components: EngineComponents, settings: EngineSettings) -> Self {
        let EngineComponents {
            extractor,
            embedder,
            negation,
            categorizer,
            metadata,
            index,
        } = components;
        Self {
            search: SimilaritySearch::new(Arc::clone(&metadata), Arc::clone(&index)),
            writer: DualStoreWriter::new(Arc::clone(&metadata), Arc::clone(&index)),
            checker: ConsistencyChecker::new(Arc::clone(&metadata), Arc::clone(&index)),
            locks: OwnerLocks::new(),
            extractor,
            embedder,
            negation,
            categorizer,
            metadata,
            index,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn reconcile(
        &self,
        owner: &str,
        utterance: &str,
    ) -> Result<MemoryChangeSet, MemoryError> {
        let source = format!("utterance:{}", uuid::Uuid::new_v4());
        self.reconcile_with_source(owner, utterance, &source).await
    }

    pub async fn reconcile_with_source(
        &self,
        owner: &str,
        utterance: &str,
        source: &str,
    ) -> Result<MemoryChangeSet, MemoryError> {
        self.reconcile_with_deadline(owner, utterance, source, self.settings.deadline)
            .await
    }

    /// Extract, embed, then decide and apply each candidate in order.
    ///
    /// Nothing is written until every candidate has an embedding. The
    /// deadline is checked between candidates; a candidate that has started
    /// writing always runs to completion. A candidate that fails after
    /// earlier ones were applied ends the call with
    /// [`MemoryError::Interrupted`], which carries what was committed.
    pub async fn reconcile_with_deadline(
        &self,
        owner: &str,
        utterance: &str,
        source: &str,
        deadline: Duration,
    ) -> Result<MemoryChangeSet, MemoryError> {
        validate_owner(owner)?;
        let deadline_at = Instant::now() + deadline;

        let raw = tokio::time::timeout_at(deadline_at, self.extractor.extract(utterance))
            .await
            .map_err(|_| deadline_exceeded(MemoryChangeSet::default(), 0))?
            .map_err(|e| MemoryError::ExtractionFailed(format!("{e:#}")))?;

        let candidates = validate_candidates(raw, self.settings.limits);
        if candidates.is_empty() {
            tracing::debug!(owner, "no candidate facts in utterance");
            return Ok(MemoryChangeSet::default());
        }

        let vectors = tokio::time::timeout_at(deadline_at, self.embed_candidates(&candidates))
            .await
            .map_err(|_| deadline_exceeded(MemoryChangeSet::default(), candidates.len()))??;

        let mut changes = MemoryChangeSet::default();
        let total = candidates.len();
        for (done, (fact, vector)) in candidates.into_iter().zip(vectors).enumerate() {
            if Instant::now() >= deadline_at {
                return Err(deadline_exceeded(changes, total - done));
            }
            let Ok(guard) = tokio::time::timeout_at(deadline_at, self.locks.acquire(owner)).await
            else {
                return Err(deadline_exceeded(changes, total - done));
            };

            let outcome = self.process_candidate(owner, fact, vector, source).await;
            drop(guard);
            match outcome {
                Ok(outcome) => changes.record(outcome),
                Err(cause) if changes.is_empty() => return Err(cause),
                Err(cause) => return Err(interrupted(changes, total - done - 1, cause)),
            }
        }

        tracing::debug!(
            owner,
            added = changes.added.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            noop = changes.noop.len(),
            "reconcile finished"
        );
        Ok(changes)
    }

    async fn embed_candidates(&self, candidates: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        let texts: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(format!("{e:#}")))?;

        if vectors.len() != candidates.len() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "provider '{}' returned {} vectors for {} facts",
                self.embedder.name(),
                vectors.len(),
                candidates.len()
            )));
        }
        if vectors.iter().any(Vec::is_empty) {
            return Err(MemoryError::EmbeddingFailed(format!(
                "provider '{}' returned an empty vector",
                self.embedder.name()
            )));
        }
        let width = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|v| width > 0 && v.len() != width) {
            return Err(MemoryError::EmbeddingFailed(format!(
                "provider '{}' returned {} dimensions, expected {width}",
                self.embedder.name(),
                bad.len()
            )));
        }
        Ok(vectors)
    }

    /// Lookup, decide and apply for one candidate. Caller holds the owner lock.
    async fn process_candidate(
        &self,
        owner: &str,
        fact: String,
        vector: Vec<f32>,
        source: &str,
    ) -> Result<CandidateOutcome, MemoryError> {
        let neighbors = self
            .search
            .nearest_neighbors(owner, &vector, self.settings.top_k)
            .await?;
        let best = neighbors.first();
        let best_match = best.map(|m| BestMatch {
            score: m.score,
            text: &m.memory.text,
        });

        let retracts = match best {
            Some(m) if self.settings.policy.needs_retraction_check(best_match) => self
                .negation
                .retracts(&fact, &m.memory.text)
                .await
                .map_err(|e| MemoryError::RetractionCheckFailed(format!("{e:#}")))?,
            _ => false,
        };

        let action = self.settings.policy.decide(&fact, best_match, retracts);
        tracing::debug!(
            owner,
            fact = %fact,
            %action,
            best_score = ?best.map(|m| m.score),
            best_id = ?best.map(|m| m.memory.id.as_str()),
            retracts,
            "candidate decided"
        );

        let score = best.map(|m| m.score);
        let memory_id = match (action, best) {
            (MemoryAction::Noop, Some(m)) => m.memory.id.clone(),
            (MemoryAction::Update, Some(m)) => {
                let update = MemoryUpdate::new(fact.clone(), vector, source);
                let updated = self
                    .writer
                    .apply(MemoryMutation::Update {
                        id: m.memory.id.clone(),
                        update,
                    })
                    .await?;
                self.categorize(&updated).await;
                updated.id
            }
            (MemoryAction::Delete, Some(m)) => {
                self.writer
                    .apply(MemoryMutation::Delete {
                        id: m.memory.id.clone(),
                        source: source.to_string(),
                    })
                    .await?
                    .id
            }
            _ => {
                let record = MemoryRecord::new(owner, fact.clone(), vector, source);
                let added = self.writer.apply(MemoryMutation::Add(record)).await?;
                self.categorize(&added).await;
                added.id
            }
        };

        Ok(CandidateOutcome {
            fact,
            action,
            memory_id,
            score,
        })
    }

    /// Tags are advisory: a categorizer failure never fails the candidate.
    async fn categorize(&self, record: &MemoryRecord) {
        let categories = match self.categorizer.categorize(&record.text).await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::warn!(memory_id = %record.id, "categorization failed: {e:#}");
                return;
            }
        };
        if let Err(e) = self.metadata.add_categories(&record.id, &categories).await {
            tracing::warn!(memory_id = %record.id, "storing categories failed: {e:#}");
        }
    }

    /// Ranked live memories of `owner` similar to `text`; skips extraction.
    pub async fn query(
        &self,
        owner: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        validate_owner(owner)?;
        if text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed_one(text)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(format!("{e:#}")))?;
        let width = self.embedder.dimensions();
        if vector.is_empty() || (width > 0 && vector.len() != width) {
            return Err(MemoryError::EmbeddingFailed(format!(
                "provider '{}' returned {} dimensions, expected {width}",
                self.embedder.name(),
                vector.len()
            )));
        }

        let found = self.search.nearest_neighbors(owner, &vector, limit).await?;
        let ids: Vec<String> = found.iter().map(|m| m.memory.id.clone()).collect();
        self.log_access(owner, &ids, AccessKind::Search).await;
        Ok(found)
    }

    /// Live memories of `owner`, newest first.
    pub async fn list_active(&self, owner: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        validate_owner(owner)?;
        let records = self
            .metadata
            .list_active(owner)
            .await
            .map_err(|e| MemoryError::metadata(&e))?;
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.log_access(owner, &ids, AccessKind::List).await;
        Ok(records)
    }

    /// Explicit deletion of one memory through the dual-store protocol.
    pub async fn forget(&self, owner: &str, memory_id: &str) -> Result<MemoryRecord, MemoryError> {
        validate_owner(owner)?;
        let _guard = self.locks.acquire(owner).await;
        let row = self
            .metadata
            .get(memory_id)
            .await
            .map_err(|e| MemoryError::metadata(&e))?;
        match row {
            Some(record) if record.owner == owner && record.state.is_live() => {
                self.writer
                    .apply(MemoryMutation::Delete {
                        id: record.id,
                        source: "forget".to_string(),
                    })
                    .await
            }
            _ => Err(MemoryError::NotFound(memory_id.to_string())),
        }
    }

    /// Tombstone every live memory of `owner`; returns the deleted ids.
    pub async fn forget_all(&self, owner: &str) -> Result<Vec<String>, MemoryError> {
        validate_owner(owner)?;
        let _guard = self.locks.acquire(owner).await;
        let live = self
            .metadata
            .list_active(owner)
            .await
            .map_err(|e| MemoryError::metadata(&e))?;

        let mut deleted = Vec::with_capacity(live.len());
        for record in live {
            let tomb = self
                .writer
                .apply(MemoryMutation::Delete {
                    id: record.id,
                    source: "forget_all".to_string(),
                })
                .await?;
            deleted.push(tomb.id);
        }
        Ok(deleted)
    }

    pub async fn check(&self, owner: &str) -> Result<ConsistencyReport, MemoryError> {
        validate_owner(owner)?;
        let _guard = self.locks.acquire(owner).await;
        self.checker.check(owner).await
    }

    pub async fn repair(&self, owner: &str) -> Result<RepairReport, MemoryError> {
        validate_owner(owner)?;
        let _guard = self.locks.acquire(owner).await;
        self.checker.repair(owner).await
    }

    /// Owners known to the metadata store.
    pub async fn owners(&self) -> Result<Vec<String>, MemoryError> {
        self.metadata
            .owners()
            .await
            .map_err(|e| MemoryError::metadata(&e))
    }

    pub async fn health_check(&self) -> StoreHealth {
        StoreHealth {
            metadata: self.metadata.health_check().await,
            vector: self.index.health_check().await,
        }
    }

    async fn log_access(&self, owner: &str, ids: &[String], kind: AccessKind) {
        if let Err(e) = self.metadata.record_access(owner, ids, kind).await {
            tracing::warn!(owner, %kind, "access log write failed: {e:#}");
        }
    }
}

fn validate_owner(owner: &str) -> Result<(), MemoryError> {
    if owner.trim().is_empty() {
        return Err(MemoryError::InvalidInput("owner must not be empty".into()));
    }
    Ok(())
}

fn interrupted(completed: MemoryChangeSet, abandoned: usize, cause: MemoryError) -> MemoryError {
    tracing::warn!(
        committed = completed.outcomes.len(),
        abandoned,
        "reconcile interrupted: {cause}"
    );
    MemoryError::Interrupted {
        completed,
        abandoned,
        cause: Box::new(cause),
    }
}

fn deadline_exceeded(completed: MemoryChangeSet, abandoned: usize) -> MemoryError {
    tracing::warn!(
        committed = completed.outcomes.len(),
        abandoned,
        "reconcile deadline exceeded"
    );
    MemoryError::DeadlineExceeded {
        completed,
        abandoned,
    }
}
