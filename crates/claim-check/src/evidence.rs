//! Evidence assembly: web search hits and URL context for the outbound prompt.
//!
//! Both collaborators are best-effort enrichment. Any failure degrades to
//! "less evidence" and is never surfaced to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordination::ensemble::truncate_chars;
use coordination::Citation;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::dispatcher::{authorize, build_client, ensure_success};
use crate::errors::DispatchError;
use crate::request::ClaimRequest;

/// Maximum search hits embedded in the prompt.
pub const MAX_EVIDENCE_ENTRIES: usize = 5;

/// Maximum characters of each hit's description in the prompt.
pub const MAX_EVIDENCE_DESCRIPTION_CHARS: usize = 220;

/// One web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Ranked web search for a claim.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, DispatchError>;
}

/// Short summary of a referenced page.
#[async_trait]
pub trait UrlSummarizer: Send + Sync {
    async fn summarize(&self, url: &str) -> Result<Option<String>, DispatchError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    summary: Option<String>,
}

/// `GET {base}?q=...` search client.
pub struct HttpEvidenceProvider {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl HttpEvidenceProvider {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, DispatchError> {
        Ok(Self {
            endpoint,
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl EvidenceProvider for HttpEvidenceProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, DispatchError> {
        let request = self.client.get(&self.endpoint.url).query(&[("q", query)]);
        let response = authorize(request, &self.endpoint).send().await?;
        let body: SearchResponse = ensure_success(response).await?.json().await?;
        Ok(body.results)
    }
}

/// `POST {base}` `{url}` summarizer client.
pub struct HttpUrlSummarizer {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl HttpUrlSummarizer {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, DispatchError> {
        Ok(Self {
            endpoint,
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl UrlSummarizer for HttpUrlSummarizer {
    async fn summarize(&self, url: &str) -> Result<Option<String>, DispatchError> {
        let request = self
            .client
            .post(&self.endpoint.url)
            .json(&serde_json::json!({ "url": url }));
        let response = authorize(request, &self.endpoint).send().await?;
        let body: SummaryResponse = ensure_success(response).await?.json().await?;
        Ok(body.summary.filter(|s| !s.trim().is_empty()))
    }
}

/// Evidence gathered for one claim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceBundle {
    /// Caller context, or the summary of the context URL
    pub context: Option<String>,
    /// Valid citations from the search hits (up to five)
    pub citations: Vec<Citation>,
    /// Bullet lines for the prompt, empty when nothing was found
    pub prompt_block: String,
}

/// Builds the evidence embedded in the claim-check prompt.
#[derive(Clone, Default)]
pub struct EvidenceAssembler {
    search: Option<Arc<dyn EvidenceProvider>>,
    summarizer: Option<Arc<dyn UrlSummarizer>>,
}

impl EvidenceAssembler {
    pub fn new(
        search: Option<Arc<dyn EvidenceProvider>>,
        summarizer: Option<Arc<dyn UrlSummarizer>>,
    ) -> Self {
        Self { search, summarizer }
    }

    /// Caller context text, else a summary of the context URL.
    async fn resolve_context(&self, request: &ClaimRequest) -> Option<String> {
        if let Some(text) = request.context_text() {
            return Some(text.to_string());
        }
        let url = request.context_link()?;
        let summarizer = self.summarizer.as_ref()?;

        match summarizer.summarize(url).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(url, error = %e, "URL summary failed, continuing without context");
                None
            }
        }
    }

    async fn search_hits(&self, claim: &str) -> Vec<SearchHit> {
        let Some(search) = self.search.as_ref() else {
            return Vec::new();
        };
        match search.search(claim).await {
            Ok(hits) => {
                debug!(hits = hits.len(), "Web evidence retrieved");
                hits
            }
            Err(e) => {
                warn!(error = %e, "Web evidence search failed, continuing without evidence");
                Vec::new()
            }
        }
    }

    /// Gather context and search evidence. Never fails.
    pub async fn assemble(&self, request: &ClaimRequest) -> EvidenceBundle {
        let context = self.resolve_context(request).await;
        let hits = self.search_hits(request.claim.trim()).await;
        let hits = &hits[..hits.len().min(MAX_EVIDENCE_ENTRIES)];

        let citations = hits
            .iter()
            .filter_map(|h| {
                Citation::new(&h.source, Some(h.url.as_str()), Some(h.description.as_str()))
            })
            .collect();

        EvidenceBundle {
            context,
            citations,
            prompt_block: format_evidence(hits),
        }
    }
}

/// One bullet per hit, descriptions truncated.
pub fn format_evidence(hits: &[SearchHit]) -> String {
    hits.iter()
        .take(MAX_EVIDENCE_ENTRIES)
        .map(|hit| {
            let source = if hit.source.trim().is_empty() {
                "Unknown source"
            } else {
                hit.source.trim()
            };
            let description =
                truncate_chars(hit.description.trim(), MAX_EVIDENCE_DESCRIPTION_CHARS);
            if hit.url.trim().is_empty() {
                format!("- {source}: {description}")
            } else {
                format!("- {source} ({}): {description}", hit.url.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
