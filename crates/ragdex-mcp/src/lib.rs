//! MCP server interface exposing ragdex retrieval to agents.
//!
//! Implements a Model Context Protocol server using rmcp that exposes
//! `search_documents`, `find_in_index` and `index_health` over stdio.
//!
//! # Examples
//!
//! ```no_run
//! use ragdex_core::RagdexConfig;
//!
//! # async fn example() -> Result<(), ragdex_core::RagdexError> {
//! ragdex_mcp::server::run_server(&RagdexConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod server;
pub mod tools;
