use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored memory.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemoryState {
    /// Row written, vector not yet confirmed; invisible to every read path.
    Pending,
    Active,
    Updated,
    Deleted,
}

impl MemoryState {
    /// Live memories are searchable and own exactly one vector.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Updated)
    }
}

/// Authoritative record of one memory, as held by the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub owner: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub state: MemoryState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl MemoryRecord {
    /// A fresh `Active` memory with a new id.
    pub fn new(
        owner: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        source: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            text: text.into(),
            embedding,
            state: MemoryState::Active,
            created_at: now,
            updated_at: now,
            source: source.into(),
            categories: Vec::new(),
        }
    }

    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            memory_id: self.id.clone(),
            owner: self.owner.clone(),
            embedding: self.embedding.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Field set written by `MetadataStore::update`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryUpdate {
    pub text: String,
    pub embedding: Vec<f32>,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl MemoryUpdate {
    pub fn new(text: impl Into<String>, embedding: Vec<f32>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embedding,
            source: source.into(),
            updated_at: Utc::now(),
        }
    }
}

/// One vector as held by a `VectorIndex` backend.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub memory_id: String,
    pub owner: String,
    pub embedding: Vec<f32>,
    pub updated_at: DateTime<Utc>,
}

/// Raw vector-index hit, score normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub memory_id: String,
    pub score: f32,
    pub updated_at: DateTime<Utc>,
}

/// Index hit joined with its metadata row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: MemoryRecord,
    pub score: f32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryAction {
    Add,
    Update,
    Delete,
    Noop,
}

/// Which half of the dual store an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StoreKind {
    Metadata,
    Vector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    Add,
    Update,
    Delete,
}

/// A single logical mutation handed to the dual-store transaction layer.
#[derive(Debug, Clone)]
pub enum MemoryMutation {
    Add(MemoryRecord),
    Update { id: String, update: MemoryUpdate },
    Delete { id: String, source: String },
}

impl MemoryMutation {
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Add(_) => MutationKind::Add,
            Self::Update { .. } => MutationKind::Update,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }

    #[must_use]
    pub fn memory_id(&self) -> &str {
        match self {
            Self::Add(record) => &record.id,
            Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// Result for one processed candidate fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub fact: String,
    pub action: MemoryAction,
    pub memory_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Aggregated result of one reconcile call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryChangeSet {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub noop: Vec<String>,
    pub outcomes: Vec<CandidateOutcome>,
}

impl MemoryChangeSet {
    pub fn record(&mut self, outcome: CandidateOutcome) {
        let bucket = match outcome.action {
            MemoryAction::Add => &mut self.added,
            MemoryAction::Update => &mut self.updated,
            MemoryAction::Delete => &mut self.deleted,
            MemoryAction::Noop => &mut self.noop,
        };
        bucket.push(outcome.memory_id.clone());
        self.outcomes.push(outcome);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of candidates that changed a store.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }
}

/// Row of the status history ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub memory_id: String,
    pub old_state: Option<MemoryState>,
    pub new_state: MemoryState,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccessKind {
    Search,
    List,
}

/// Timestamps are persisted in a fixed-width RFC 3339 form so that string
/// order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
