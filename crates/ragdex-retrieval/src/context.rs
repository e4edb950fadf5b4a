//! Shared, read-only serving state.
//!
//! A [`SharedIndex`] is constructed once per process and cloned into every
//! request handler. The underlying index is loaded on first use behind a
//! one-time initialization barrier and never mutated afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ragdex_core::{Chunk, HealthReport, HealthStatus, IndexMeta, RagdexError, RuntimeConfig};
use ragdex_store::{load_index, ArtifactPaths, StoredIndex, VectorSearch};
use tokio::sync::{OnceCell, Semaphore};

/// A loaded index: chunk records plus the search structure over their
/// embeddings, row `i` belonging to `chunks[i]`.
pub struct LoadedIndex {
    pub meta: IndexMeta,
    pub chunks: Vec<Chunk>,
    pub vectors: Box<dyn VectorSearch>,
}

impl std::fmt::Debug for LoadedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedIndex")
            .field("meta", &self.meta)
            .field("chunks", &self.chunks.len())
            .field("dim", &self.vectors.dim())
            .finish()
    }
}

impl LoadedIndex {
    /// Pair chunk records with a search structure.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::StructuralMismatch`] if the row count differs
    /// from the chunk count.
    pub fn new(
        meta: IndexMeta,
        chunks: Vec<Chunk>,
        vectors: Box<dyn VectorSearch>,
    ) -> Result<Self, RagdexError> {
        if vectors.len() != chunks.len() {
            return Err(RagdexError::StructuralMismatch(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        Ok(Self {
            meta,
            chunks,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl From<StoredIndex> for LoadedIndex {
    fn from(stored: StoredIndex) -> Self {
        Self {
            meta: stored.meta,
            chunks: stored.chunks,
            vectors: Box::new(stored.vectors),
        }
    }
}

struct SharedInner {
    cell: OnceCell<Arc<LoadedIndex>>,
    artifacts: Option<ArtifactPaths>,
}

/// Process-wide handle to the lazily loaded index. Cheap to clone.
#[derive(Clone)]
pub struct SharedIndex {
    inner: Arc<SharedInner>,
}

impl std::fmt::Debug for SharedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedIndex")
            .field("artifacts", &self.inner.artifacts)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl SharedIndex {
    /// Load from `artifacts` on first use.
    pub fn from_artifacts(artifacts: ArtifactPaths) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                cell: OnceCell::new(),
                artifacts: Some(artifacts),
            }),
        }
    }

    /// Wrap an index that is already in memory.
    pub fn preloaded(index: LoadedIndex) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                cell: OnceCell::new_with(Some(Arc::new(index))),
                artifacts: None,
            }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.cell.initialized()
    }

    /// The loaded index, loading it if this is the first call.
    ///
    /// Concurrent first callers share a single load. A failed load is not
    /// remembered, so a later call retries (for example after a build).
    ///
    /// # Errors
    ///
    /// [`RagdexError::Unavailable`] when the artifacts are missing, or any
    /// load error such as [`RagdexError::StructuralMismatch`].
    pub async fn get(&self) -> Result<Arc<LoadedIndex>, RagdexError> {
        self.inner
            .cell
            .get_or_try_init(|| async {
                let Some(artifacts) = self.inner.artifacts.clone() else {
                    return Err(RagdexError::Unavailable("no index has been loaded".into()));
                };
                let stored = tokio::task::spawn_blocking(move || load_index(&artifacts))
                    .await
                    .map_err(|e| RagdexError::Io(std::io::Error::other(e)))??;
                Ok(Arc::new(LoadedIndex::from(stored)))
            })
            .await
            .cloned()
    }

    /// Readiness derived from whether the index can be loaded.
    pub async fn health(&self) -> HealthReport {
        match self.get().await {
            Ok(index) => HealthReport::ready(index.len()),
            Err(RagdexError::Unavailable(msg)) => HealthReport::failed(HealthStatus::Unavailable, msg),
            Err(e) => HealthReport::failed(HealthStatus::Error, e.to_string()),
        }
    }
}

/// Bounds in-flight model-inference calls and gives each one a deadline.
///
/// The deadline covers waiting for a permit as well as the call itself, so an
/// abandoned or stuck call never holds resources indefinitely.
#[derive(Debug, Clone)]
pub struct InferenceLimiter {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl InferenceLimiter {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            config.max_concurrent_inference,
            Duration::from_secs(config.inference_timeout_secs),
        )
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `call` under a permit and the configured deadline.
    ///
    /// # Errors
    ///
    /// [`RagdexError::Timeout`] naming `operation` if the deadline passes,
    /// otherwise whatever `call` returns.
    pub async fn run<T, F>(&self, operation: &'static str, call: F) -> Result<T, RagdexError>
    where
        F: Future<Output = Result<T, RagdexError>>,
    {
        let guarded = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| RagdexError::Unavailable("inference limiter is closed".into()))?;
            call.await
        };

        match tokio::time::timeout(self.timeout, guarded).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, secs = self.timeout.as_secs(), "inference call timed out");
                Err(RagdexError::Timeout {
                    operation,
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}
