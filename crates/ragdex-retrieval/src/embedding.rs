//! Embedding collaborators.
//!
//! [`HttpEmbedder`] talks to either an OpenAI-compatible `/embeddings`
//! endpoint (text-embeddings-inference, vLLM, OpenAI itself) or Ollama's
//! `/api/embed`. Every returned row is L2-normalized so that inner product
//! equals cosine similarity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragdex_core::{EmbeddingConfig, RagdexError};
use serde::{Deserialize, Serialize};

const DEFAULT_OPENAI_BASE_URL: &str = "http://localhost:8080/v1";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns texts into fixed-dimension, unit-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts`, returning one normalized row per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagdexError>;

    /// Model identifier recorded in the index metadata.
    fn model(&self) -> &str;
}

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
///
/// # Examples
///
/// ```
/// use ragdex_retrieval::embedding::l2_normalize;
///
/// let mut v = vec![3.0, 4.0];
/// l2_normalize(&mut v);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert!((v[1] - 0.8).abs() < 1e-6);
/// ```
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenAi,
    Ollama,
}

/// HTTP client for a hosted or local embedding model.
///
/// # Examples
///
/// ```
/// use ragdex_core::EmbeddingConfig;
/// use ragdex_retrieval::embedding::{Embedder, HttpEmbedder};
///
/// let embedder = HttpEmbedder::from_config(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(embedder.model(), "paraphrase-multilingual-mpnet-base-v2");
/// ```
pub struct HttpEmbedder {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimensions: Option<usize>,
    batch_size: usize,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiItem>,
}

#[derive(Deserialize)]
struct OpenAiItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbedder {
    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::Config`] for an unknown provider, a zero batch
    /// size, or if the HTTP client cannot be constructed.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, RagdexError> {
        let provider = match config.provider.to_lowercase().as_str() {
            "openai" => Provider::OpenAi,
            "ollama" => Provider::Ollama,
            other => {
                return Err(RagdexError::Config(format!(
                    "unknown embedding provider '{other}': expected \"openai\" or \"ollama\""
                )))
            }
        };
        if config.batch_size == 0 {
            return Err(RagdexError::Config(
                "embedding.batch_size must be at least 1".into(),
            ));
        }

        let default_url = match provider {
            Provider::OpenAi => DEFAULT_OPENAI_BASE_URL,
            Provider::Ollama => DEFAULT_OLLAMA_BASE_URL,
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagdexError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(default_url)
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size,
        })
    }

    async fn embed_openai(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagdexError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&OpenAiRequest {
                model: &self.model,
                input: batch,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagdexError::Embedding(format!("HTTP request failed: {e}")))?;
        let response = check_status(response).await?;

        let mut body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| RagdexError::Embedding(format!("failed to parse response: {e}")))?;
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    async fn embed_ollama(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagdexError> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&OllamaRequest {
                model: &self.model,
                input: batch,
                truncate: true,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RagdexError::Embedding(format!(
                        "cannot connect to Ollama at {}; is `ollama serve` running?",
                        self.base_url
                    ))
                } else {
                    RagdexError::Embedding(format!("HTTP request failed: {e}"))
                }
            })?;
        let response = check_status(response).await?;

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| RagdexError::Embedding(format!("failed to parse response: {e}")))?;
        Ok(body.embeddings)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RagdexError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".into());
    Err(RagdexError::Embedding(format!(
        "embedding API returned {status}: {body}"
    )))
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagdexError> {
        let mut rows = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let mut embedded = match self.provider {
                Provider::OpenAi => self.embed_openai(batch).await?,
                Provider::Ollama => self.embed_ollama(batch).await?,
            };
            if embedded.len() != batch.len() {
                return Err(RagdexError::Embedding(format!(
                    "sent {} texts but received {} embeddings",
                    batch.len(),
                    embedded.len()
                )));
            }
            for row in &mut embedded {
                if let Some(expected) = self.dimensions {
                    if row.len() != expected {
                        return Err(RagdexError::Embedding(format!(
                            "model returned {} dimensions, configured {expected}",
                            row.len()
                        )));
                    }
                }
                l2_normalize(row);
            }
            rows.extend(embedded);
        }

        Ok(rows)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build the configured embedder.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, RagdexError> {
    Ok(Arc::new(HttpEmbedder::from_config(config)?))
}
