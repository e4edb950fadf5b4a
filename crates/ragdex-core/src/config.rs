use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RagdexError;

/// Top-level configuration loaded from `.ragdex.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use ragdex_core::RagdexConfig;
///
/// let config = RagdexConfig::default();
/// assert_eq!(config.retrieval.default_top_k, 5);
/// assert_eq!(config.chunking.max_chars, 600);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagdexConfig {
    /// Chunking parameters used by `ragdex build`.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Ranking and filtering parameters for search.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Optional relevance reranker.
    #[serde(default)]
    pub reranker: RerankerConfig,
    /// Concurrency and timeout limits for model calls.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Where the persisted index lives.
    #[serde(default)]
    pub index: IndexConfig,
}

impl RagdexConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::Io`] if the file cannot be read, or
    /// [`RagdexError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ragdex_core::RagdexConfig;
    /// use std::path::Path;
    ///
    /// let config = RagdexConfig::from_file(Path::new(".ragdex.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, RagdexError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ragdex_core::RagdexConfig;
    ///
    /// let toml = r#"
    /// [retrieval]
    /// default_top_k = 8
    /// "#;
    /// let config = RagdexConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.retrieval.default_top_k, 8);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, RagdexError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// Recognised variables: `RAG_MIN_SCORE`, `RAG_USE_RERANKER`
    /// (`1`, `true`, `yes`), and `RAGDEX_EMBEDDING_API_KEY`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` as the variable source.
    ///
    /// An unparseable `RAG_MIN_SCORE` resets the threshold to 0 (no filtering).
    ///
    /// # Examples
    ///
    /// ```
    /// use ragdex_core::RagdexConfig;
    ///
    /// let config = RagdexConfig::default().with_overrides_from(|key| match key {
    ///     "RAG_MIN_SCORE" => Some("0.8".into()),
    ///     "RAG_USE_RERANKER" => Some("yes".into()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.retrieval.min_score, 0.8);
    /// assert!(config.retrieval.use_reranker);
    /// ```
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("RAG_MIN_SCORE") {
            let raw = raw.trim();
            if !raw.is_empty() {
                self.retrieval.min_score = raw
                    .parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0);
            }
        }
        if let Some(raw) = lookup("RAG_USE_RERANKER") {
            self.retrieval.use_reranker =
                matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(key) = lookup("RAGDEX_EMBEDDING_API_KEY") {
            if !key.trim().is_empty() {
                self.embedding.api_key = Some(key);
            }
        }
        self
    }

    /// Reject configuration that would make chunking or ranking ill-defined.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::Config`] describing the first offending value.
    ///
    /// # Examples
    ///
    /// ```
    /// use ragdex_core::RagdexConfig;
    ///
    /// let mut config = RagdexConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.chunking.overlap_chars = config.chunking.max_chars;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), RagdexError> {
        self.chunking.validate()?;
        let r = &self.retrieval;
        if r.max_top_k == 0 {
            return Err(RagdexError::Config("retrieval.max_top_k must be at least 1".into()));
        }
        if r.default_top_k == 0 || r.default_top_k > r.max_top_k {
            return Err(RagdexError::Config(format!(
                "retrieval.default_top_k must be in 1..={}",
                r.max_top_k
            )));
        }
        if !r.lexical_score.is_finite() || !r.min_score.is_finite() || r.min_score < 0.0 {
            return Err(RagdexError::Config(
                "retrieval scores must be finite and min_score non-negative".into(),
            ));
        }
        if r.min_lexical_matches == 0 {
            return Err(RagdexError::Config(
                "retrieval.min_lexical_matches must be at least 1".into(),
            ));
        }
        if self.runtime.max_concurrent_inference == 0 {
            return Err(RagdexError::Config(
                "runtime.max_concurrent_inference must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Chunking parameters, measured in characters.
///
/// # Examples
///
/// ```
/// use ragdex_core::ChunkingConfig;
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.overlap_chars, 80);
/// assert_eq!(ChunkingConfig::build_preset().max_chars, 380);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Upper bound on chunk length (default: 600).
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Trailing characters carried into the next chunk (default: 80).
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// Chunks shorter than this are dropped unless nothing was emitted yet (default: 100).
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
}

fn default_max_chars() -> usize {
    600
}

fn default_overlap_chars() -> usize {
    80
}

fn default_min_chunk_chars() -> usize {
    100
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            min_chunk_chars: default_min_chunk_chars(),
        }
    }
}

impl ChunkingConfig {
    /// Smaller chunks used when building an index over dense prose such as
    /// dissertations, where individual people and facts need to surface.
    pub fn build_preset() -> Self {
        Self {
            max_chars: 380,
            overlap_chars: 60,
            min_chunk_chars: 60,
        }
    }

    /// # Errors
    ///
    /// Returns [`RagdexError::Config`] if `max_chars` is zero, the overlap
    /// would not leave room for new content, or `min_chunk_chars` exceeds
    /// `max_chars` (every chunk after the first would be dropped).
    pub fn validate(&self) -> Result<(), RagdexError> {
        if self.max_chars == 0 {
            return Err(RagdexError::Config("chunking.max_chars must be at least 1".into()));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(RagdexError::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        if self.min_chunk_chars > self.max_chars {
            return Err(RagdexError::Config(format!(
                "chunking.min_chunk_chars ({}) must not exceed max_chars ({})",
                self.min_chunk_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// How raw reranker output is mapped onto a comparable score.
///
/// # Examples
///
/// ```
/// use ragdex_core::ScoreCalibration;
///
/// assert_eq!(ScoreCalibration::Logistic.apply(0.0), 0.5);
/// assert_eq!(ScoreCalibration::Identity.apply(2.5), 2.5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreCalibration {
    /// `1 / (1 + e^-x)`, for cross-encoders that emit logits.
    #[default]
    Logistic,
    /// Use the reranker output unchanged.
    Identity,
}

impl ScoreCalibration {
    /// Map a raw reranker score to its calibrated value.
    pub fn apply(self, raw: f32) -> f32 {
        match self {
            ScoreCalibration::Logistic => 1.0 / (1.0 + (-raw).exp()),
            ScoreCalibration::Identity => raw,
        }
    }
}

/// Retrieval and ranking parameters.
///
/// The lexical score and the specific-token length are tuned values, kept
/// configurable rather than fixed.
///
/// # Examples
///
/// ```
/// use ragdex_core::RetrievalConfig;
///
/// let config = RetrievalConfig::default();
/// assert_eq!(config.lexical_score, 0.80);
/// assert_eq!(config.specific_token_len, 7);
/// assert_eq!(config.max_top_k, 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// `top_k` used when a caller does not pass one (default: 5).
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Largest `top_k` a caller may request (default: 20).
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Results scoring below this are dropped (default: 0.0 = no filtering).
    #[serde(default)]
    pub min_score: f32,
    /// Run the reranker by default (default: false).
    #[serde(default)]
    pub use_reranker: bool,
    /// Fixed score assigned to lexical matches (default: 0.80).
    #[serde(default = "default_lexical_score")]
    pub lexical_score: f32,
    /// Query tokens at least this long count as specific (default: 7).
    #[serde(default = "default_specific_token_len")]
    pub specific_token_len: usize,
    /// Query tokens shorter than this are ignored (default: 2).
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    /// Distinct query tokens a chunk must contain to match lexically (default: 2).
    #[serde(default = "default_min_lexical_matches")]
    pub min_lexical_matches: usize,
    /// Chunk text sent to the reranker is cut to this many characters (default: 512).
    #[serde(default = "default_rerank_max_chars")]
    pub rerank_max_chars: usize,
    /// Mapping applied to raw reranker scores (default: logistic).
    #[serde(default)]
    pub calibration: ScoreCalibration,
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    20
}

fn default_lexical_score() -> f32 {
    0.80
}

fn default_specific_token_len() -> usize {
    7
}

fn default_min_token_len() -> usize {
    2
}

fn default_min_lexical_matches() -> usize {
    2
}

fn default_rerank_max_chars() -> usize {
    512
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            min_score: 0.0,
            use_reranker: false,
            lexical_score: default_lexical_score(),
            specific_token_len: default_specific_token_len(),
            min_token_len: default_min_token_len(),
            min_lexical_matches: default_min_lexical_matches(),
            rerank_max_chars: default_rerank_max_chars(),
            calibration: ScoreCalibration::default(),
        }
    }
}

/// Configuration for the embedding provider.
///
/// # Examples
///
/// ```
/// use ragdex_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "openai");
/// assert_eq!(config.model, "paraphrase-multilingual-mpnet-base-v2");
/// assert_eq!(config.batch_size, 32);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider API flavour: `"openai"` (any OpenAI-compatible server) or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name (default: `"paraphrase-multilingual-mpnet-base-v2"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL of the provider; defaults per provider when unset.
    pub base_url: Option<String>,
    /// API key for the provider, if it requires one.
    pub api_key: Option<String>,
    /// Expected embedding dimensions; checked against responses when set.
    pub dimensions: Option<usize>,
    /// Texts per embedding request (default: 32).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_provider() -> String {
    "openai".into()
}

fn default_embedding_model() -> String {
    "paraphrase-multilingual-mpnet-base-v2".into()
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
            api_key: None,
            dimensions: None,
            batch_size: default_batch_size(),
        }
    }
}

/// Configuration for the optional cross-encoder reranker.
///
/// No reranker is used unless `base_url` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL of a `/rerank` endpoint.
    pub base_url: Option<String>,
    /// Model name forwarded to the endpoint, if it needs one.
    pub model: Option<String>,
    /// API key for the endpoint.
    pub api_key: Option<String>,
}

/// Limits on model-inference calls made while serving queries.
///
/// # Examples
///
/// ```
/// use ragdex_core::RuntimeConfig;
///
/// let config = RuntimeConfig::default();
/// assert_eq!(config.max_concurrent_inference, 4);
/// assert_eq!(config.inference_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Embedder/reranker calls allowed in flight at once (default: 4).
    #[serde(default = "default_max_concurrent_inference")]
    pub max_concurrent_inference: usize,
    /// Deadline for a single embedder/reranker call (default: 30).
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,
}

fn default_max_concurrent_inference() -> usize {
    4
}

fn default_inference_timeout_secs() -> u64 {
    30
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_inference: default_max_concurrent_inference(),
            inference_timeout_secs: default_inference_timeout_secs(),
        }
    }
}

/// Location of the persisted index artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding `index.json` and `index.vec` (default: `output`).
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}
