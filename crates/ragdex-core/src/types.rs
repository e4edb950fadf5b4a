use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded span of a document's text, the unit that gets embedded and ranked.
///
/// Field names match the persisted record dump.
///
/// # Examples
///
/// ```
/// use ragdex_core::Chunk;
///
/// let chunk = Chunk {
///     doc_id: "thesis".into(),
///     chunk_index: 0,
///     text: "Glazunov Anatoly Alekseevich, doctor of sciences".into(),
///     source_path: "docs/thesis.txt".into(),
///     section: String::new(),
/// };
/// assert_eq!(chunk.source_label(), "thesis.txt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable short identifier for the source document.
    pub doc_id: String,
    /// Zero-based position of this chunk within its document.
    pub chunk_index: usize,
    /// Chunk text, never blank.
    pub text: String,
    /// Path of the document the chunk came from.
    #[serde(default)]
    pub source_path: String,
    /// Heading the document started with, if any.
    #[serde(default)]
    pub section: String,
}

impl Chunk {
    /// Label used to group chunks by source document.
    pub fn source_label(&self) -> &str {
        source_label(&self.source_path, &self.doc_id)
    }
}

/// Resolve the source label for a chunk: the file name of `source_path`,
/// falling back to `doc_id` when the path is empty or has no file name.
///
/// # Examples
///
/// ```
/// use ragdex_core::source_label;
///
/// assert_eq!(source_label("/data/Test_sample.pdf", "Test_sample"), "Test_sample.pdf");
/// assert_eq!(source_label("", "notes"), "notes");
/// ```
pub fn source_label<'a>(source_path: &'a str, doc_id: &'a str) -> &'a str {
    Path::new(source_path)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(doc_id)
}

/// Metadata describing how an index was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Paths of the documents that were chunked.
    #[serde(default)]
    pub source_docs: Vec<String>,
    /// Embedding model that produced the vectors.
    #[serde(alias = "model")]
    pub model_name: String,
    /// Embedding dimensionality.
    pub dim: usize,
    /// When the index was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
}

/// One entry of a search response.
///
/// # Examples
///
/// ```
/// use ragdex_core::RankedChunk;
///
/// let hit = RankedChunk {
///     text: "Dividends are paid quarterly.".into(),
///     score: 0.8,
///     source: "finance.md".into(),
///     doc_id: "finance".into(),
///     section: "Investing".into(),
///     position: 12,
/// };
/// let json = serde_json::to_value(&hit).unwrap();
/// assert_eq!(json["docId"], "finance");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedChunk {
    /// Chunk text.
    pub text: String,
    /// Final score after all ranking stages.
    pub score: f32,
    /// Resolved source label (file name or document id).
    pub source: String,
    /// Document identifier of the chunk.
    pub doc_id: String,
    /// Section heading of the chunk's document.
    pub section: String,
    /// Row position of the chunk in the index.
    pub position: usize,
}

/// Parameters of a single search call.
///
/// # Examples
///
/// ```
/// use ragdex_core::SearchRequest;
///
/// let request = SearchRequest::new("who is Glazunov Anatoly").with_top_k(10);
/// assert_eq!(request.top_k, 10);
/// assert_eq!(request.min_score, 0.0);
/// assert!(!request.use_reranker);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Natural-language query.
    pub query: String,
    /// Maximum number of results.
    pub top_k: usize,
    /// Results scoring below this are dropped.
    pub min_score: f32,
    /// Rescore candidates with the reranker.
    pub use_reranker: bool,
}

impl SearchRequest {
    /// A request with `top_k = 5`, no threshold, and no reranking.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 5,
            min_score: 0.0,
            use_reranker: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_reranker(mut self, use_reranker: bool) -> Self {
        self.use_reranker = use_reranker;
        self
    }
}

/// Readiness of the shared index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Index loaded and searchable.
    Ok,
    /// Artifacts are missing; build the index first.
    Unavailable,
    /// Artifacts exist but could not be loaded.
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Unavailable => write!(f, "unavailable"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

/// Health/readiness report for front ends.
///
/// # Examples
///
/// ```
/// use ragdex_core::{HealthReport, HealthStatus};
///
/// let report = HealthReport::ready(42);
/// assert!(report.is_ready());
/// let json = serde_json::to_value(&report).unwrap();
/// assert_eq!(json["status"], "ok");
/// assert_eq!(json["chunksLoaded"], 42);
/// assert!(json.get("error").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Number of chunks loaded (0 unless ready).
    pub chunks_loaded: usize,
    /// Why the index is not ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn ready(chunks_loaded: usize) -> Self {
        Self {
            status: HealthStatus::Ok,
            chunks_loaded,
            error: None,
        }
    }

    pub fn failed(status: HealthStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            chunks_loaded: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use ragdex_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable listing.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
