//! MCP server setup and lifecycle.
//!
//! Provides [`run_server`] which starts the stdio-based MCP server and blocks
//! until the client disconnects.

use ragdex_core::{RagdexConfig, RagdexError};
use ragdex_retrieval::RetrievalEngine;
use rmcp::{model::*, tool_handler, transport::stdio, ServerHandler, ServiceExt};

use crate::tools::RagdexServer;

const SERVER_INSTRUCTIONS: &str = "\
ragdex answers questions from a local document index. Use these tools:\n\
- search_documents: Ranked passages relevant to a natural-language query\n\
- find_in_index: Check whether an exact phrase survived indexing\n\
- index_health: Whether the index is loaded and how many chunks it holds";

#[tool_handler]
impl ServerHandler for RagdexServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "ragdex".to_string(),
                title: Some("ragdex document search".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some("Hybrid lexical and semantic search over local documents".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        }
    }
}

/// Start the MCP server on stdio transport.
///
/// This is called by the `ragdex mcp` CLI subcommand. The index is loaded
/// lazily on the first tool call, so the server starts even before
/// `ragdex build` has run.
///
/// # Errors
///
/// Returns [`RagdexError`] if the configuration is invalid, the server fails
/// to initialize, or the transport fails.
pub async fn run_server(config: &RagdexConfig) -> Result<(), RagdexError> {
    let engine = RetrievalEngine::from_config(config)?;
    tracing::info!(
        index = %config.index.dir.display(),
        reranker = engine.has_reranker(),
        "starting MCP server"
    );

    let service = RagdexServer::new(engine)
        .serve(stdio())
        .await
        .map_err(|e| RagdexError::Config(format!("MCP server failed to start: {e}")))?;

    service
        .waiting()
        .await
        .map_err(|e| RagdexError::Config(format!("MCP server error: {e}")))?;

    Ok(())
}
