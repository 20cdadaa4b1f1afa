use crate::config::MemoryConfig;
use crate::providers::http_client::{Upstream, upstream_client};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;

const OPENAI_EMBEDDINGS_BASE: &str = "https://api.openai.com";

/// Converts fact text to vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Vector width every call must return; 0 when the width is not pinned.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut results = self.embed(&[text]).await?;
        results
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding result"))
    }
}

/// Stands in when `memory.embedding_provider = "none"`. Reconciling needs
/// vectors, so every call fails; listing and forgetting still work.
pub struct DisabledEmbedding;

#[async_trait]
impl EmbeddingProvider for DisabledEmbedding {
    fn name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding provider is disabled (memory.embedding_provider = \"none\")")
    }
}

// ── OpenAI-compatible /v1/embeddings ─────────────────────────

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    /// Position of the matching input; servers may answer out of order.
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedding {
    client: reqwest::Client,
    endpoint: String,
    bearer: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedding {
    pub fn new(base_url: &str, api_key: &str, model: &str, dims: usize) -> Self {
        Self {
            client: upstream_client(Upstream::Embeddings),
            endpoint: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            bearer: format!("Bearer {api_key}"),
            model: model.to_string(),
            dims,
        }
    }

    /// Put vectors back in input order and hold the server to the
    /// configured count and width.
    fn into_ordered(&self, reply: EmbeddingResponse, expected: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        if reply.data.len() != expected {
            anyhow::bail!(
                "embedding API returned {} vectors for {expected} inputs",
                reply.data.len()
            );
        }

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
        for (position, datum) in reply.data.into_iter().enumerate() {
            let slot = datum.index.unwrap_or(position);
            if slot >= expected || slots[slot].is_some() {
                anyhow::bail!("embedding API returned a duplicate or out-of-range index {slot}");
            }
            if self.dims > 0 && datum.embedding.len() != self.dims {
                anyhow::bail!(
                    "embedding API returned {} dimensions, memory.embedding_dimensions is {}",
                    datum.embedding.len(),
                    self.dims
                );
            }
            slots[slot] = Some(datum.embedding);
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| anyhow::anyhow!("embedding API skipped an input")))
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", &self.bearer)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("embedding request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("embedding API error {status}");
        }

        let reply: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("invalid embedding response: {e}"))?;
        self.into_ordered(reply, texts.len())
    }
}

// ── Factory ──────────────────────────────────────────────────

/// Hosts a user-supplied embedding endpoint may not point at.
fn is_internal_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').trim_matches(['[', ']']);
    if host.eq_ignore_ascii_case("localhost") || host.eq_ignore_ascii_case("metadata.google.internal")
    {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback()
                || ip.is_unspecified()
                || ip.is_unique_local()
                || ip.is_unicast_link_local()
        }
        Err(_) => false,
    }
}

/// Validate the URL half of `custom:URL` and return it without a trailing slash.
fn checked_base_url(raw: &str) -> anyhow::Result<String> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("invalid custom embedding URL '{raw}': {e}"))?;
    if url.scheme() != "https" {
        anyhow::bail!("custom embedding URL must use https");
    }
    if !url.username().is_empty() || url.password().is_some() {
        anyhow::bail!("custom embedding URL must not carry credentials");
    }
    if url.query().is_some() || url.fragment().is_some() {
        anyhow::bail!("custom embedding URL must not carry a query or fragment");
    }
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("custom embedding URL has no host"))?;
    if is_internal_host(host) {
        anyhow::bail!("custom embedding URL points at an internal host ({host})");
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

pub fn create_embedding_provider(
    memory: &MemoryConfig,
    api_key: Option<&str>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider = memory.embedding_provider.as_str();
    if provider == "none" {
        return Ok(Arc::new(DisabledEmbedding));
    }
    if memory.embedding_dimensions == 0 {
        anyhow::bail!("memory.embedding_dimensions must be > 0 for provider '{provider}'");
    }

    let base = match provider {
        "openai" => OPENAI_EMBEDDINGS_BASE.to_string(),
        custom if custom.starts_with("custom:") => {
            checked_base_url(custom.trim_start_matches("custom:"))?
        }
        other => anyhow::bail!("Unknown embedding provider '{other}'. Supported: none, openai, custom:URL"),
    };

    Ok(Arc::new(OpenAiEmbedding::new(
        &base,
        api_key.unwrap_or(""),
        &memory.embedding_model,
        memory.embedding_dimensions,
    )))
}
