use crate::memory::extractor::strip_code_fence;
use crate::providers::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Decides whether a candidate fact retracts a stored memory.
#[async_trait]
pub trait NegationDetector: Send + Sync {
    fn name(&self) -> &str;

    async fn retracts(&self, candidate: &str, existing: &str) -> anyhow::Result<bool>;
}

// ── Keyword heuristic ────────────────────────────────────────

const RETRACTION_MARKERS: [&str; 14] = [
    "no longer",
    "not anymore",
    "any more",
    "anymore",
    "used to",
    "forget that",
    "forget about",
    "stopped",
    "quit",
    "never",
    "don't",
    "doesn't",
    "isn't",
    "not",
];

/// Plain negations are interchangeable: "do not eat" and "don't eat" say the
/// same thing.
const PLAIN_NEGATIONS: [&str; 5] = ["not", "never", "don't", "doesn't", "isn't"];

const STOPWORDS: [&str; 24] = [
    "i'm", "i've", "the", "and", "but", "you", "are", "was", "were", "been", "have", "has",
    "had", "does", "did", "that", "this", "now", "really", "very", "just", "still", "also",
    "with",
];

/// Words on either side of a marker that it can apply to.
const MARKER_WINDOW: usize = 3;

/// Flags a retraction when the candidate carries a negation marker the stored
/// memory lacks, and the marker sits within a few words of something the
/// stored memory talks about.
pub struct KeywordNegationDetector;

impl KeywordNegationDetector {
    /// Lowercased words grouped by clause. Punctuation and "but" end a clause.
    fn clauses(text: &str) -> Vec<Vec<String>> {
        let normalized = text.to_lowercase().replace('\u{2019}', "'");
        let mut clauses = Vec::new();
        for part in normalized.split([',', ';', ':', '.', '!', '?']) {
            let mut clause = Vec::new();
            for word in part
                .split(|c: char| !(c.is_alphanumeric() || c == '\''))
                .filter(|w| !w.is_empty())
            {
                if word == "but" {
                    clauses.push(std::mem::take(&mut clause));
                } else {
                    clause.push(word.to_string());
                }
            }
            clauses.push(clause);
        }
        clauses.retain(|clause| !clause.is_empty());
        clauses
    }

    /// `(marker, start, end)` for every marker occurrence in one clause.
    fn marker_spans(clause: &[String]) -> Vec<(&'static str, usize, usize)> {
        let mut spans = Vec::new();
        for marker in RETRACTION_MARKERS {
            let parts: Vec<&str> = marker.split(' ').collect();
            for (start, window) in clause.windows(parts.len()).enumerate() {
                if window.iter().zip(&parts).all(|(word, part)| word == part) {
                    spans.push((marker, start, start + parts.len()));
                }
            }
        }
        spans
    }

    fn family(marker: &str) -> &str {
        if PLAIN_NEGATIONS.contains(&marker) {
            "not"
        } else {
            marker
        }
    }

    fn is_content(word: &str) -> bool {
        word.chars().count() >= 3
            && !STOPWORDS.contains(&word)
            && !RETRACTION_MARKERS.contains(&word)
    }

    /// Same word, or sharing a four-letter stem ("smoking" / "smoke").
    fn same_stem(a: &str, b: &str) -> bool {
        a == b
            || (a.len() >= 4 && b.len() >= 4 && a.as_bytes()[..4] == b.as_bytes()[..4])
    }
}

#[async_trait]
impl NegationDetector for KeywordNegationDetector {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn retracts(&self, candidate: &str, existing: &str) -> anyhow::Result<bool> {
        let stored = Self::clauses(existing);
        let stored_families: HashSet<&str> = stored
            .iter()
            .flat_map(|clause| Self::marker_spans(clause))
            .map(|(marker, _, _)| Self::family(marker))
            .collect();
        let stored_words: Vec<&str> = stored
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|w| Self::is_content(w))
            .collect();

        Ok(Self::clauses(candidate).iter().any(|clause| {
            Self::marker_spans(clause)
                .into_iter()
                .filter(|(marker, _, _)| !stored_families.contains(Self::family(marker)))
                .any(|(_, start, end)| {
                    let before = &clause[start.saturating_sub(MARKER_WINDOW)..start];
                    let after = &clause[end..(end + MARKER_WINDOW).min(clause.len())];
                    before.iter().chain(after).any(|word| {
                        Self::is_content(word)
                            && stored_words.iter().any(|s| Self::same_stem(word, s))
                    })
                })
        }))
    }
}

// ── LLM classifier ───────────────────────────────────────────

const RETRACTION_PROMPT: &str = "\
You compare a new statement from the user with a fact previously remembered about them.
Answer whether the new statement says the remembered fact is no longer true.
Return JSON only, shaped as {\"retracts\": true} or {\"retracts\": false}.";

#[derive(Debug, Deserialize)]
struct RetractionVerdict {
    retracts: bool,
}

pub struct LlmNegationDetector {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmNegationDetector {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl NegationDetector for LlmNegationDetector {
    fn name(&self) -> &str {
        "llm"
    }

    async fn retracts(&self, candidate: &str, existing: &str) -> anyhow::Result<bool> {
        let message = format!("Remembered fact: {existing}\nNew statement: {candidate}");
        let raw = self
            .provider
            .chat_with_system(Some(RETRACTION_PROMPT), &message, &self.model, 0.0)
            .await?;
        let verdict: RetractionVerdict = serde_json::from_str(strip_code_fence(&raw))
            .map_err(|e| anyhow::anyhow!("retraction classifier reply is malformed: {e}"))?;
        Ok(verdict.retracts)
    }
}
