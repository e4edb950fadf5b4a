//! Hybrid retrieval over a persisted chunk index.
//!
//! Combines a lexical floor for exact-entity matches with vector similarity,
//! per-source pooling, optional cross-encoder reranking, and round-robin
//! diversification across source documents. Also hosts the collaborator
//! clients (embedder, reranker), the shared serving context and the offline
//! index build.

pub mod context;
pub mod embedding;
pub mod engine;
pub mod indexer;
pub mod query;
pub mod ranking;
pub mod rerank;

pub use context::{InferenceLimiter, LoadedIndex, SharedIndex};
pub use embedding::{create_embedder, Embedder, HttpEmbedder};
pub use engine::RetrievalEngine;
pub use indexer::{build_index, BuildParams, BuildReport};
pub use rerank::{create_reranker, HttpReranker, Reranker};
