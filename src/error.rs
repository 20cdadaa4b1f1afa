use crate::memory::types::{MemoryChangeSet, MutationKind, StoreKind};
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `memoria`.
///
/// Library callers match on these to decide recovery strategy; adapter code
/// keeps using `anyhow::Result` for ad-hoc context chains and is mapped into
/// [`MemoryError`] at the engine boundary.
#[derive(Debug, Error)]
pub enum Error {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Memory ──────────────────────────────────────────────────────────
    #[error("memory: {0}")]
    Memory(#[from] MemoryError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Memory errors ──────────────────────────────────────────────────────────

/// Failure taxonomy of the reconciliation engine.
///
/// `PartialApply` (directly or as the cause of `Interrupted`) is the only
/// failure that means the two stores may disagree; use
/// [`MemoryError::is_inconsistency`] to route it to a repair job.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("fact extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("retraction check failed: {0}")]
    RetractionCheckFailed(String),

    #[error("{store} store unavailable: {message}")]
    StoreUnavailable { store: StoreKind, message: String },

    #[error(
        "partial apply of {mutation} on memory {memory_id}: {cause}; compensation failed: {compensation}"
    )]
    PartialApply {
        memory_id: String,
        mutation: MutationKind,
        cause: String,
        compensation: String,
    },

    #[error("deadline exceeded; {abandoned} candidate(s) abandoned")]
    DeadlineExceeded {
        completed: MemoryChangeSet,
        abandoned: usize,
    },

    /// A candidate failed after earlier candidates of the same call were
    /// committed. `completed` lists what is now in the stores.
    #[error(
        "reconcile interrupted after {} committed candidate(s), {abandoned} abandoned: {cause}",
        completed.outcomes.len()
    )]
    Interrupted {
        completed: MemoryChangeSet,
        abandoned: usize,
        #[source]
        cause: Box<MemoryError>,
    },

    #[error("memory {0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl MemoryError {
    pub(crate) fn metadata(err: &anyhow::Error) -> Self {
        Self::StoreUnavailable {
            store: StoreKind::Metadata,
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn vector(err: &anyhow::Error) -> Self {
        Self::StoreUnavailable {
            store: StoreKind::Vector,
            message: format!("{err:#}"),
        }
    }

    /// True when the dual-store invariant may be violated.
    #[must_use]
    pub fn is_inconsistency(&self) -> bool {
        match self {
            Self::PartialApply { .. } => true,
            Self::Interrupted { cause, .. } => cause.is_inconsistency(),
            _ => false,
        }
    }

    /// Change set committed before the call was interrupted, if any.
    #[must_use]
    pub const fn partial_change_set(&self) -> Option<&MemoryChangeSet> {
        match self {
            Self::DeadlineExceeded { completed, .. } | Self::Interrupted { completed, .. } => {
                Some(completed)
            }
            _ => None,
        }
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;
