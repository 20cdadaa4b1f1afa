#![allow(dead_code, clippy::cast_precision_loss)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use memoria::memory::categorizer::{Categorizer, NoopCategorizer};
use memoria::memory::embeddings::EmbeddingProvider;
use memoria::memory::extractor::{FactExtractor, SentenceFactExtractor};
use memoria::memory::negation::{KeywordNegationDetector, NegationDetector};
use memoria::memory::types::{
    AccessKind, IndexEntry, MemoryRecord, MemoryUpdate, ScoredId, StatusChange,
};
use memoria::memory::{
    EngineComponents, EngineSettings, InMemoryVectorIndex, MetadataStore, ReconciliationEngine,
    SqliteMetadataStore, VectorIndex,
};

pub const TEST_EMBEDDING_DIMS: usize = 8;
pub const TEST_EMBEDDING_SEED: u64 = 0x5EED_BA5E;

// ── Embedding ────────────────────────────────────────────────

/// Scripted vectors for known texts, hashed pseudo-random vectors otherwise.
pub struct ScriptedEmbedder {
    dims: usize,
    seed: u64,
    script: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new(script: &[(&str, [f32; TEST_EMBEDDING_DIMS])]) -> Self {
        Self {
            dims: TEST_EMBEDDING_DIMS,
            seed: TEST_EMBEDDING_SEED,
            script: script
                .iter()
                .map(|(text, v)| ((*text).to_string(), v.to_vec()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fnv1a64(seed: u64, bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ seed;
        for &byte in bytes {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn splitmix64(mut x: u64) -> u64 {
        x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = x;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn unit_f32(x: u64) -> f32 {
        const U24_MAX: f32 = ((1u32 << 24) - 1) as f32;
        #[allow(clippy::cast_possible_truncation)]
        let top_u24: u32 = (x >> 40) as u32;
        (top_u24 as f32 / U24_MAX) * 2.0 - 1.0
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let base = Self::fnv1a64(self.seed, text.as_bytes());
        (0..self.dims)
            .map(|idx| Self::unit_f32(Self::splitmix64(base ^ (idx as u64))))
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    fn name(&self) -> &str {
        "memory-test-harness"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                self.script
                    .get(*text)
                    .cloned()
                    .unwrap_or_else(|| self.hashed(text))
            })
            .collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        TEST_EMBEDDING_DIMS
    }

    async fn embed(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding endpoint returned 503")
    }
}

// ── Extraction ───────────────────────────────────────────────

pub struct FailingExtractor;

#[async_trait]
impl FactExtractor for FailingExtractor {
    fn name(&self) -> &str {
        "failing"
    }

    async fn extract(&self, _text: &str) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("language model timed out")
    }
}

/// Returns fixed facts for every utterance.
pub struct FixedExtractor(pub Vec<String>);

#[async_trait]
impl FactExtractor for FixedExtractor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract(&self, _text: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

pub struct SlowExtractor {
    pub delay: Duration,
}

#[async_trait]
impl FactExtractor for SlowExtractor {
    fn name(&self) -> &str {
        "slow"
    }

    async fn extract(&self, text: &str) -> anyhow::Result<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        SentenceFactExtractor.extract(text).await
    }
}

// ── Negation and categorization ──────────────────────────────

/// Retraction classifier whose endpoint is down.
pub struct FailingNegation;

#[async_trait]
impl NegationDetector for FailingNegation {
    fn name(&self) -> &str {
        "failing"
    }

    async fn retracts(&self, _candidate: &str, _existing: &str) -> anyhow::Result<bool> {
        anyhow::bail!("classifier returned 502")
    }
}

/// "personal" for names, "food" for sushi, plus "renamed" for Jonathan.
pub struct TopicCategorizer;

#[async_trait]
impl Categorizer for TopicCategorizer {
    fn name(&self) -> &str {
        "topic"
    }

    async fn categorize(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let mut tags = Vec::new();
        if text.contains("name") {
            tags.push("personal".to_string());
        }
        if text.contains("Jonathan") {
            tags.push("renamed".to_string());
        }
        if text.contains("sushi") {
            tags.push("food".to_string());
        }
        Ok(tags)
    }
}

pub struct FailingCategorizer;

#[async_trait]
impl Categorizer for FailingCategorizer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn categorize(&self, _text: &str) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("categorizer reply is malformed")
    }
}

// ── Failure-injecting stores ─────────────────────────────────

#[derive(Default)]
pub struct IndexFaults {
    pub upsert: AtomicBool,
    pub delete: AtomicBool,
}

pub struct FlakyIndex {
    inner: InMemoryVectorIndex,
    pub faults: IndexFaults,
}

impl FlakyIndex {
    pub fn new() -> Self {
        Self {
            inner: InMemoryVectorIndex::new(),
            faults: IndexFaults::default(),
        }
    }

    pub fn entry(&self, memory_id: &str) -> Option<IndexEntry> {
        self.inner.get(memory_id)
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn upsert(&self, entry: &IndexEntry) -> anyhow::Result<()> {
        anyhow::ensure!(!self.faults.upsert.load(Ordering::SeqCst), "index upsert refused");
        self.inner.upsert(entry).await
    }

    async fn delete(&self, memory_id: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!self.faults.delete.load(Ordering::SeqCst), "index delete refused");
        self.inner.delete(memory_id).await
    }

    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> anyhow::Result<Vec<ScoredId>> {
        self.inner.query(owner, vector, k).await
    }

    async fn ids_for_owner(&self, owner: &str) -> anyhow::Result<Vec<String>> {
        self.inner.ids_for_owner(owner).await
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct MetadataFaults {
    pub insert: AtomicBool,
    pub activate: AtomicBool,
    pub update: AtomicBool,
    pub tombstone: AtomicBool,
    pub discard: AtomicBool,
    pub restore: AtomicBool,
    pub access_log: AtomicBool,
}

pub struct FlakyMetadata {
    inner: SqliteMetadataStore,
    pub faults: MetadataFaults,
    pub insert_delay: Option<Duration>,
}

impl FlakyMetadata {
    pub async fn new(insert_delay: Option<Duration>) -> Self {
        Self {
            inner: SqliteMetadataStore::in_memory()
                .await
                .expect("in-memory metadata store should open"),
            faults: MetadataFaults::default(),
            insert_delay,
        }
    }
}

fn refuse(flag: &AtomicBool, what: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!flag.load(Ordering::SeqCst), "metadata {what} refused");
    Ok(())
}

#[async_trait]
impl MetadataStore for FlakyMetadata {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn insert(&self, record: &MemoryRecord) -> anyhow::Result<()> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        refuse(&self.faults.insert, "insert")?;
        self.inner.insert(record).await
    }

    async fn activate(&self, id: &str) -> anyhow::Result<MemoryRecord> {
        refuse(&self.faults.activate, "activate")?;
        self.inner.activate(id).await
    }

    async fn pending(&self, owner: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        self.inner.pending(owner).await
    }

    async fn update(&self, id: &str, update: &MemoryUpdate) -> anyhow::Result<MemoryRecord> {
        refuse(&self.faults.update, "update")?;
        self.inner.update(id, update).await
    }

    async fn tombstone(&self, id: &str, source: &str) -> anyhow::Result<MemoryRecord> {
        refuse(&self.faults.tombstone, "tombstone")?;
        self.inner.tombstone(id, source).await
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<MemoryRecord>> {
        self.inner.get(id).await
    }

    async fn list_active(&self, owner: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        self.inner.list_active(owner).await
    }

    async fn discard(&self, id: &str) -> anyhow::Result<()> {
        refuse(&self.faults.discard, "discard")?;
        self.inner.discard(id).await
    }

    async fn restore(&self, snapshot: &MemoryRecord) -> anyhow::Result<()> {
        refuse(&self.faults.restore, "restore")?;
        self.inner.restore(snapshot).await
    }

    async fn add_categories(&self, id: &str, categories: &[String]) -> anyhow::Result<()> {
        self.inner.add_categories(id, categories).await
    }

    async fn owners(&self) -> anyhow::Result<Vec<String>> {
        self.inner.owners().await
    }

    async fn record_access(
        &self,
        owner: &str,
        memory_ids: &[String],
        kind: AccessKind,
    ) -> anyhow::Result<()> {
        refuse(&self.faults.access_log, "access log")?;
        self.inner.record_access(owner, memory_ids, kind).await
    }

    async fn status_history(&self, id: &str) -> anyhow::Result<Vec<StatusChange>> {
        self.inner.status_history(id).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}

// ── Fixtures ─────────────────────────────────────────────────

/// Vectors for the conversational scenarios. Cosine against
/// "My name is John": Jonathan ~0.95 (refine band). "I used to live in
/// Boston" against "I live in Boston" ~0.95 and carries a retraction marker.
pub fn scenario_script() -> Vec<(&'static str, [f32; TEST_EMBEDDING_DIMS])> {
    vec![
        ("My name is John", [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ("My name is Jonathan", [0.9, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ("I live in Boston", [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ("I used to live in Boston", [0.0, 0.0, 0.95, 0.3, 0.0, 0.0, 0.0, 0.0]),
        ("Now I live in Seattle", [0.0, 0.0, 0.3, 0.0, 0.95, 0.0, 0.0, 0.0]),
        ("I love sushi", [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
        ("I really love sushi", [0.0, 0.0, 0.0, 0.0, 0.0, 0.99, 0.1, 0.0]),
        ("I don't eat meat", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
        ("I have a dog", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
        ("I have a cat", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.6, 0.0]),
    ]
}

pub struct Harness {
    pub engine: Arc<ReconciliationEngine>,
    pub metadata: Arc<FlakyMetadata>,
    pub index: Arc<FlakyIndex>,
    pub embedder: Arc<ScriptedEmbedder>,
}

pub struct HarnessBuilder {
    extractor: Arc<dyn FactExtractor>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    negation: Arc<dyn NegationDetector>,
    categorizer: Arc<dyn Categorizer>,
    settings: EngineSettings,
    insert_delay: Option<Duration>,
}

impl HarnessBuilder {
    pub fn extractor(mut self, extractor: impl FactExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn embedder(mut self, embedder: impl EmbeddingProvider + 'static) -> Self {
        self.embedder = Some(Arc::new(embedder));
        self
    }

    pub fn negation(mut self, negation: impl NegationDetector + 'static) -> Self {
        self.negation = Arc::new(negation);
        self
    }

    pub fn categorizer(mut self, categorizer: impl Categorizer + 'static) -> Self {
        self.categorizer = Arc::new(categorizer);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    pub async fn build(self) -> Harness {
        let metadata = Arc::new(FlakyMetadata::new(self.insert_delay).await);
        let index = Arc::new(FlakyIndex::new());
        let scripted = Arc::new(ScriptedEmbedder::new(&scenario_script()));
        let embedder: Arc<dyn EmbeddingProvider> = self
            .embedder
            .unwrap_or_else(|| scripted.clone() as Arc<dyn EmbeddingProvider>);

        let engine = ReconciliationEngine::new(
            EngineComponents {
                extractor: self.extractor,
                embedder,
                negation: self.negation,
                categorizer: self.categorizer,
                metadata: metadata.clone(),
                index: index.clone(),
            },
            self.settings,
        );

        Harness {
            engine: Arc::new(engine),
            metadata,
            index,
            embedder: scripted,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        extractor: Arc::new(SentenceFactExtractor),
        embedder: None,
        negation: Arc::new(KeywordNegationDetector),
        categorizer: Arc::new(NoopCategorizer),
        settings: EngineSettings::default(),
        insert_delay: None,
    }
}

impl Harness {
    pub async fn live_texts(&self, owner: &str) -> Vec<String> {
        let mut texts: Vec<String> = self
            .metadata
            .list_active(owner)
            .await
            .expect("list_active should succeed")
            .into_iter()
            .map(|r| r.text)
            .collect();
        texts.sort();
        texts
    }

    /// Index ids and live metadata ids of `owner` must be identical.
    pub async fn assert_consistent(&self, owner: &str) {
        let mut live: Vec<String> = self
            .metadata
            .list_active(owner)
            .await
            .expect("list_active should succeed")
            .into_iter()
            .map(|r| r.id)
            .collect();
        live.sort();
        let indexed = self
            .index
            .ids_for_owner(owner)
            .await
            .expect("ids_for_owner should succeed");
        assert_eq!(live, indexed, "stores disagree for owner {owner}");
    }
}
