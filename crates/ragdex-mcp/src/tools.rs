//! Tool implementations for the ragdex MCP server.
//!
//! Three tools are exposed: `search_documents`, `find_in_index` and
//! `index_health`. Each delegates to the shared [`RetrievalEngine`] and returns
//! JSON via `CallToolResult`.

use ragdex_core::{RagdexError, SearchRequest};
use ragdex_retrieval::RetrievalEngine;
use ragdex_store::find_substring;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars, tool, tool_router, ErrorData as McpError,
};
use serde::{Deserialize, Serialize};

/// Characters of chunk text returned per `find_in_index` match.
const FIND_PREVIEW_CHARS: usize = 600;
/// Matches returned by `find_in_index` unless the caller asks otherwise.
const DEFAULT_FIND_LIMIT: usize = 20;

/// MCP server exposing the retrieval engine.
#[derive(Clone)]
pub struct RagdexServer {
    pub(crate) engine: RetrievalEngine,
    pub(crate) tool_router: ToolRouter<Self>,
}

// --- Parameter structs ---

/// Parameters for the `search_documents` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchDocumentsParams {
    /// Natural-language question or keywords.
    pub query: String,
    /// Number of passages to return (default: 5, capped by server configuration).
    pub top_k: Option<usize>,
    /// Drop passages scoring below this (default: server configuration, usually 0).
    pub min_score: Option<f32>,
    /// Rescore candidates with the cross-encoder reranker, if one is configured.
    pub use_reranker: Option<bool>,
}

/// Parameters for the `find_in_index` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindInIndexParams {
    /// Text to look for, matched case-insensitively.
    pub substring: String,
    /// Maximum matches returned (default: 20).
    pub limit: Option<usize>,
}

// --- Response structs ---

#[derive(Serialize)]
struct SearchResponse {
    chunks: Vec<SearchHit>,
}

#[derive(Serialize)]
struct SearchHit {
    text: String,
    score: f32,
    source: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindResponse {
    total_chunks: usize,
    total_matches: usize,
    matches: Vec<FindMatch>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindMatch {
    position: usize,
    doc_id: String,
    chunk_index: usize,
    preview: String,
}

fn mcp_err(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

/// Caller mistakes become `invalid_params`; everything else is internal.
fn to_mcp_err(err: RagdexError) -> McpError {
    match err {
        RagdexError::InvalidInput(msg) => McpError::invalid_params(msg, None),
        other => mcp_err(other.to_string()),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| mcp_err(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[tool_router]
impl RagdexServer {
    /// Create a server around an engine.
    pub fn new(engine: RetrievalEngine) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    /// Fill request defaults from configuration and clamp `top_k` into range.
    fn search_request(&self, params: SearchDocumentsParams) -> Result<SearchRequest, McpError> {
        if params.query.trim().is_empty() {
            return Err(McpError::invalid_params("query must not be empty", None));
        }
        let config = self.engine.config();
        let top_k = params
            .top_k
            .unwrap_or(config.default_top_k)
            .clamp(1, config.max_top_k.max(1));

        Ok(SearchRequest::new(params.query)
            .with_top_k(top_k)
            .with_min_score(params.min_score.unwrap_or(config.min_score))
            .with_reranker(params.use_reranker.unwrap_or(config.use_reranker)))
    }

    #[tool(
        name = "search_documents",
        description = "Search the local document index for passages relevant to a query. Combines exact keyword matches for names and rare terms with semantic similarity, and spreads results across source documents. Returns passages with a relevance score in [0, 1] and the source file name."
    )]
    pub async fn search_documents(
        &self,
        Parameters(params): Parameters<SearchDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = self.search_request(params)?;
        let results = self.engine.search(&request).await.map_err(to_mcp_err)?;
        tracing::debug!(results = results.len(), "search_documents");

        let chunks = results
            .into_iter()
            .map(|r| SearchHit {
                text: r.text,
                score: r.score,
                source: r.source,
            })
            .collect();
        json_result(&SearchResponse { chunks })
    }

    #[tool(
        name = "find_in_index",
        description = "Case-insensitive substring lookup over every indexed chunk. Use this to check whether a specific name or phrase made it into the index; results carry no relevance score."
    )]
    pub async fn find_in_index(
        &self,
        Parameters(params): Parameters<FindInIndexParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.substring.trim().is_empty() {
            return Err(McpError::invalid_params("substring must not be empty", None));
        }
        let index = self.engine.index().get().await.map_err(to_mcp_err)?;
        let found = find_substring(&index.chunks, &params.substring);
        let limit = params.limit.unwrap_or(DEFAULT_FIND_LIMIT);

        let matches = found
            .iter()
            .take(limit)
            .map(|m| FindMatch {
                position: m.position,
                doc_id: m.chunk.doc_id.clone(),
                chunk_index: m.chunk.chunk_index,
                preview: m.chunk.text.chars().take(FIND_PREVIEW_CHARS).collect(),
            })
            .collect();

        json_result(&FindResponse {
            total_chunks: index.len(),
            total_matches: found.len(),
            matches,
        })
    }

    #[tool(
        name = "index_health",
        description = "Report whether the document index is loaded and searchable, and how many chunks it holds."
    )]
    pub async fn index_health(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.engine.health().await)
    }
}
