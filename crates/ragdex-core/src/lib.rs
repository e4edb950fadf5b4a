//! Core types, configuration, and error handling for ragdex.
//!
//! This crate provides the shared foundation used by all other ragdex crates:
//! - [`RagdexError`]: unified error type using `thiserror`
//! - [`RagdexConfig`]: configuration loaded from `.ragdex.toml`
//! - Shared records: [`Chunk`], [`IndexMeta`], [`RankedChunk`],
//!   [`SearchRequest`], [`HealthReport`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    ChunkingConfig, EmbeddingConfig, IndexConfig, RagdexConfig, RerankerConfig, RetrievalConfig,
    RuntimeConfig, ScoreCalibration,
};
pub use error::RagdexError;
pub use types::{
    source_label, Chunk, HealthReport, HealthStatus, IndexMeta, OutputFormat, RankedChunk,
    SearchRequest,
};

/// A convenience `Result` type for ragdex operations.
pub type Result<T> = std::result::Result<T, RagdexError>;
