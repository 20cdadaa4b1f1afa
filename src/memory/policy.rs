use crate::memory::types::MemoryAction;
use serde::{Deserialize, Serialize};

/// Similarity thresholds that turn a best match into an action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub noop_threshold: f32,
    pub refine_threshold: f32,
    pub retraction_floor: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            noop_threshold: 0.95,
            refine_threshold: 0.85,
            retraction_floor: 0.60,
        }
    }
}

/// Best match offered to the policy.
#[derive(Debug, Clone, Copy)]
pub struct BestMatch<'a> {
    pub score: f32,
    pub text: &'a str,
}

impl DecisionPolicy {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("noop_threshold", self.noop_threshold),
            ("refine_threshold", self.refine_threshold),
            ("retraction_floor", self.retraction_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.refine_threshold >= self.noop_threshold {
            return Err(format!(
                "refine_threshold ({}) must be lower than noop_threshold ({})",
                self.refine_threshold, self.noop_threshold
            ));
        }
        if self.retraction_floor > self.refine_threshold {
            return Err(format!(
                "retraction_floor ({}) must not exceed refine_threshold ({})",
                self.retraction_floor, self.refine_threshold
            ));
        }
        Ok(())
    }

    /// Retraction checks only matter once a match clears the floor.
    #[must_use]
    pub fn needs_retraction_check(&self, best: Option<BestMatch<'_>>) -> bool {
        best.is_some_and(|m| m.score >= self.retraction_floor)
    }

    /// Pure decision step; `retracts` is the negation verdict against `best`.
    #[must_use]
    pub fn decide(&self, candidate: &str, best: Option<BestMatch<'_>>, retracts: bool) -> MemoryAction {
        let Some(best) = best else {
            return MemoryAction::Add;
        };

        if best.score >= self.noop_threshold && !retracts {
            return MemoryAction::Noop;
        }
        if best.score >= self.refine_threshold && !retracts {
            if best.text == candidate {
                return MemoryAction::Noop;
            }
            return MemoryAction::Update;
        }
        if retracts && best.score >= self.retraction_floor {
            return MemoryAction::Delete;
        }
        MemoryAction::Add
    }
}
