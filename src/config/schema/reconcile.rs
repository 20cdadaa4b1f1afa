use crate::memory::extractor::CandidateLimits;
use crate::memory::policy::DecisionPolicy;
use crate::memory::reconcile::EngineSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Best match at or above this is already remembered
    #[serde(default = "default_noop_threshold")]
    pub noop_threshold: f32,
    /// Best match at or above this (and below noop) is refined in place
    #[serde(default = "default_refine_threshold")]
    pub refine_threshold: f32,
    /// Minimum similarity for a retraction to target a memory
    #[serde(default = "default_retraction_floor")]
    pub retraction_floor: f32,
    /// Neighbours fetched per candidate
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Whole-call budget in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Retraction detection: "keyword" | "llm"
    #[serde(default = "default_negation")]
    pub negation: String,
    /// Category tagging after add/update: "none" | "llm"
    #[serde(default = "default_categorizer")]
    pub categorizer: String,
    #[serde(default = "default_min_fact_chars")]
    pub min_fact_chars: usize,
    #[serde(default = "default_max_fact_chars")]
    pub max_fact_chars: usize,
    #[serde(default = "default_max_facts_per_utterance")]
    pub max_facts_per_utterance: usize,
}

fn default_noop_threshold() -> f32 {
    0.95
}
fn default_refine_threshold() -> f32 {
    0.85
}
fn default_retraction_floor() -> f32 {
    0.60
}
fn default_top_k() -> usize {
    5
}
fn default_deadline_ms() -> u64 {
    30_000
}
fn default_negation() -> String {
    "keyword".into()
}
fn default_categorizer() -> String {
    "none".into()
}
fn default_min_fact_chars() -> usize {
    2
}
fn default_max_fact_chars() -> usize {
    1000
}
fn default_max_facts_per_utterance() -> usize {
    20
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            noop_threshold: default_noop_threshold(),
            refine_threshold: default_refine_threshold(),
            retraction_floor: default_retraction_floor(),
            top_k: default_top_k(),
            deadline_ms: default_deadline_ms(),
            negation: default_negation(),
            categorizer: default_categorizer(),
            min_fact_chars: default_min_fact_chars(),
            max_fact_chars: default_max_fact_chars(),
            max_facts_per_utterance: default_max_facts_per_utterance(),
        }
    }
}

impl ReconcileConfig {
    pub fn policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            noop_threshold: self.noop_threshold,
            refine_threshold: self.refine_threshold,
            retraction_floor: self.retraction_floor,
        }
    }

    pub fn limits(&self) -> CandidateLimits {
        CandidateLimits {
            min_chars: self.min_fact_chars,
            max_chars: self.max_fact_chars,
            max_facts: self.max_facts_per_utterance,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            top_k: self.top_k,
            policy: self.policy(),
            limits: self.limits(),
            deadline: Duration::from_millis(self.deadline_ms),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.policy().validate()?;
        if self.top_k == 0 {
            return Err("reconcile.top_k must be > 0".into());
        }
        if self.deadline_ms == 0 {
            return Err("reconcile.deadline_ms must be > 0".into());
        }
        if !["keyword", "llm"].contains(&self.negation.as_str()) {
            return Err(format!("unknown reconcile.negation '{}'", self.negation));
        }
        if !["none", "llm"].contains(&self.categorizer.as_str()) {
            return Err(format!(
                "unknown reconcile.categorizer '{}'",
                self.categorizer
            ));
        }
        if self.min_fact_chars == 0 || self.min_fact_chars > self.max_fact_chars {
            return Err(format!(
                "reconcile fact bounds are inverted ({}..={})",
                self.min_fact_chars, self.max_fact_chars
            ));
        }
        if self.max_facts_per_utterance == 0 {
            return Err("reconcile.max_facts_per_utterance must be > 0".into());
        }
        Ok(())
    }
}
