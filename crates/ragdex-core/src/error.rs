use std::path::PathBuf;

/// Errors that can occur across ragdex.
///
/// The variants follow the failure taxonomy of the retrieval core: input
/// errors are rejected before any work is done, `Unavailable` means the index
/// has not been built or loaded yet, `StructuralMismatch` means the persisted
/// artifacts disagree with each other, and the collaborator variants wrap
/// embedder / reranker / vector-search failures. Library crates use this type
/// directly; the binary converts to `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use ragdex_core::RagdexError;
///
/// let err = RagdexError::InvalidInput("top_k must be at least 1".into());
/// assert!(err.to_string().contains("top_k"));
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum RagdexError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed request (empty query, out-of-range `top_k`, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The index has not been built yet or could not be found.
    #[error("index unavailable: {0}")]
    Unavailable(String),

    /// Persisted artifacts disagree on record count, row count, or shape.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// The embedding collaborator failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The reranking collaborator failed.
    #[error("rerank error: {0}")]
    Rerank(String),

    /// The vector-search collaborator failed.
    #[error("vector search error: {0}")]
    VectorSearch(String),

    /// A collaborator call did not finish within its deadline.
    #[error("timed out after {secs}s waiting for {operation}")]
    Timeout {
        /// Which collaborator call timed out.
        operation: &'static str,
        /// Configured deadline in seconds.
        secs: u64,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl RagdexError {
    /// Whether a caller may reasonably retry the same request later.
    ///
    /// An unavailable index may be built in the meantime, and collaborator
    /// failures are often transient. Input errors, configuration errors, and
    /// corrupted artifacts will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagdexError::Unavailable(_)
                | RagdexError::Timeout { .. }
                | RagdexError::Embedding(_)
                | RagdexError::Rerank(_)
                | RagdexError::VectorSearch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RagdexError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = RagdexError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = RagdexError::FileNotFound(PathBuf::from("/tmp/missing.md"));
        assert!(err.to_string().contains("/tmp/missing.md"));
    }

    #[test]
    fn timeout_names_operation() {
        let err = RagdexError::Timeout {
            operation: "query embedding",
            secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "timed out after 30s waiting for query embedding"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(RagdexError::Unavailable("no index".into()).is_retryable());
        assert!(RagdexError::Embedding("503".into()).is_retryable());
        assert!(!RagdexError::StructuralMismatch("rows".into()).is_retryable());
        assert!(!RagdexError::InvalidInput("empty".into()).is_retryable());
    }
}
