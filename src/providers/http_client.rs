use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("memoria/", env!("CARGO_PKG_VERSION"));

/// Which upstream a client talks to; each has its own time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    /// Chat completions for fact extraction, retraction checks and categories.
    Chat,
    /// Batch embedding requests; short, called once per utterance.
    Embeddings,
}

impl Upstream {
    const fn request_timeout(self) -> Duration {
        match self {
            Self::Chat => Duration::from_secs(60),
            Self::Embeddings => Duration::from_secs(15),
        }
    }
}

pub fn upstream_client(upstream: Upstream) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(upstream.request_timeout())
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(?upstream, "falling back to default HTTP client: {e}");
            Client::new()
        })
}
