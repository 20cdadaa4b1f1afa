use crate::providers::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Turns a raw utterance into candidate facts.
///
/// Output is untrusted; the engine runs it through [`validate_candidates`]
/// before anything touches a store.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, text: &str) -> anyhow::Result<Vec<String>>;
}

// ── LLM-backed extractor ─────────────────────────────────────

const FACT_EXTRACTION_PROMPT: &str = "\
You extract durable personal facts about the user from a single message.
Return JSON only, shaped as {\"facts\": [\"...\"]}.
Rules:
- One short, self-contained statement per fact, written in the user's voice.
- Keep facts the user corrects or retracts, phrased as the user said them.
- Ignore greetings, questions, commands, and test messages.
- Return {\"facts\": []} when the message holds no personal fact.";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FactPayload {
    Object { facts: Vec<String> },
    List(Vec<String>),
}

pub struct LlmFactExtractor {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
}

impl LlmFactExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl FactExtractor for LlmFactExtractor {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract(&self, text: &str) -> anyhow::Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .provider
            .chat_with_system(
                Some(FACT_EXTRACTION_PROMPT),
                text,
                &self.model,
                self.temperature,
            )
            .await?;
        parse_fact_payload(&raw)
    }
}

/// Strip a Markdown code fence some models wrap around JSON replies.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

pub fn parse_fact_payload(raw: &str) -> anyhow::Result<Vec<String>> {
    let body = strip_code_fence(raw);
    let payload: FactPayload = serde_json::from_str(body).map_err(|e| {
        anyhow::anyhow!("extractor reply is not a fact list: {e}")
    })?;
    Ok(match payload {
        FactPayload::Object { facts } | FactPayload::List(facts) => facts,
    })
}

// ── Offline sentence extractor ───────────────────────────────

const FIRST_PERSON: [&str; 8] = ["i", "i'm", "im", "i've", "i'd", "my", "me", "mine"];
const LEADING_FILLERS: [&str; 6] = ["actually", "well", "so", "oh", "also", "and"];

/// Heuristic splitter: one candidate per clause that says something about
/// the speaker.
pub struct SentenceFactExtractor;

impl SentenceFactExtractor {
    fn clauses(text: &str) -> impl Iterator<Item = &str> {
        text.split(['.', '!', '?', ';', '\n'])
            .flat_map(|sentence| sentence.split(" but "))
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
    }

    fn mentions_speaker(clause: &str) -> bool {
        clause
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .any(|word| FIRST_PERSON.contains(&word.to_lowercase().as_str()))
    }

    fn strip_filler(clause: &str) -> &str {
        let mut rest = clause.trim_start_matches([',', ' ']);
        loop {
            let Some(filler) = LEADING_FILLERS.iter().find(|f| {
                rest.get(..f.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(f))
                    && rest[f.len()..].starts_with([',', ' '])
            }) else {
                return rest;
            };
            rest = rest[filler.len()..].trim_start_matches([',', ' ']);
        }
    }

    fn capitalize(clause: &str) -> String {
        let mut chars = clause.chars();
        chars.next().map_or_else(String::new, |first| {
            first.to_uppercase().chain(chars).collect()
        })
    }
}

#[async_trait]
impl FactExtractor for SentenceFactExtractor {
    fn name(&self) -> &str {
        "sentence"
    }

    async fn extract(&self, text: &str) -> anyhow::Result<Vec<String>> {
        Ok(Self::clauses(text)
            .filter(|clause| Self::mentions_speaker(clause))
            .map(|clause| Self::capitalize(Self::strip_filler(clause)))
            .filter(|fact| !fact.is_empty())
            .collect())
    }
}

// ── Candidate validation ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateLimits {
    pub min_chars: usize,
    pub max_chars: usize,
    pub max_facts: usize,
}

impl Default for CandidateLimits {
    fn default() -> Self {
        Self {
            min_chars: 2,
            max_chars: 1000,
            max_facts: 20,
        }
    }
}

/// Trim, bound, dedupe and cap raw extractor output, keeping extraction order.
pub fn validate_candidates(raw: Vec<String>, limits: CandidateLimits) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();

    for candidate in raw {
        let fact = candidate.trim();
        if fact.is_empty() {
            continue;
        }
        let len = fact.chars().count();
        if len < limits.min_chars || len > limits.max_chars {
            tracing::warn!(chars = len, "dropping out-of-bounds candidate fact");
            continue;
        }
        if !seen.insert(fact.to_string()) {
            continue;
        }
        kept.push(fact.to_string());
    }

    if kept.len() > limits.max_facts {
        tracing::warn!(
            dropped = kept.len() - limits.max_facts,
            "too many candidate facts in one utterance"
        );
        kept.truncate(limits.max_facts);
    }
    kept
}
