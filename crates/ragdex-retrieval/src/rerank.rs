//! Cross-encoder reranking collaborator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragdex_core::{RagdexError, RerankerConfig};
use serde::{Deserialize, Serialize};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Scores `(query, text)` pairs directly.
///
/// Returned values are raw relevance logits, one per text in input order;
/// calibration is applied by the caller.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RagdexError>;
}

/// Client for a text-embeddings-inference style `/rerank` endpoint.
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
    model: Option<String>,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpReranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReranker")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    score: f32,
}

impl HttpReranker {
    pub fn new(base_url: &str) -> Result<Self, RagdexError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagdexError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: None,
            api_key: None,
        })
    }

    /// Create a client from config, or `None` when no reranker is configured.
    ///
    /// # Examples
    ///
    /// ```
    /// use ragdex_core::RerankerConfig;
    /// use ragdex_retrieval::rerank::HttpReranker;
    ///
    /// assert!(HttpReranker::from_config(&RerankerConfig::default()).unwrap().is_none());
    /// ```
    pub fn from_config(config: &RerankerConfig) -> Result<Option<Self>, RagdexError> {
        let Some(base_url) = config.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let mut reranker = Self::new(base_url)?;
        reranker.model = config.model.clone();
        reranker.api_key = config.api_key.clone();
        Ok(Some(reranker))
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RagdexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&RerankRequest {
                query,
                texts,
                raw_scores: true,
                model: self.model.as_deref(),
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagdexError::Rerank(format!("HTTP request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(RagdexError::Rerank(format!(
                "rerank API returned {status}: {body}"
            )));
        }

        let items: Vec<RerankItem> = response
            .json()
            .await
            .map_err(|e| RagdexError::Rerank(format!("failed to parse response: {e}")))?;
        scores_in_order(items, texts.len())
    }
}

/// The endpoint returns items sorted by relevance; put them back in input order.
fn scores_in_order(items: Vec<RerankItem>, expected: usize) -> Result<Vec<f32>, RagdexError> {
    let mut scores = vec![None; expected];
    for item in items {
        match scores.get_mut(item.index) {
            Some(slot) => *slot = Some(item.score),
            None => {
                return Err(RagdexError::Rerank(format!(
                    "rerank response index {} out of range for {expected} texts",
                    item.index
                )))
            }
        }
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| RagdexError::Rerank(format!("no score for text {i}"))))
        .collect()
}

/// Build the configured reranker, if any.
pub fn create_reranker(config: &RerankerConfig) -> Result<Option<Arc<dyn Reranker>>, RagdexError> {
    Ok(HttpReranker::from_config(config)?.map(|r| Arc::new(r) as Arc<dyn Reranker>))
}
