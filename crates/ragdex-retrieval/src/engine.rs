//! The search pipeline.
//!
//! A request runs these stages against the shared, immutable index:
//!
//! 1. **Lexical**: chunks containing enough significant query words get a
//!    fixed score, so exact-entity matches survive even when their vector
//!    similarity is low.
//! 2. **Vector**: nearest neighbors of the query embedding fill in the rest,
//!    never overwriting a lexical match.
//! 3. **Pooling**: candidates are capped per source document.
//! 4. **Rerank** (optional): a cross-encoder rescores the pool.
//! 5. **Diversify**: sources take turns filling the `top_k` slots.
//! 6. **Threshold**: results below `min_score` are dropped.

use std::sync::Arc;

use ragdex_core::{
    HealthReport, RagdexConfig, RagdexError, RankedChunk, RetrievalConfig, SearchRequest,
};
use ragdex_store::ArtifactPaths;

use crate::context::{InferenceLimiter, LoadedIndex, SharedIndex};
use crate::embedding::{create_embedder, l2_normalize, Embedder};
use crate::query::QueryTokens;
use crate::ranking::{self, Candidate, Seen};
use crate::rerank::{create_reranker, Reranker};

/// Runs searches over a [`SharedIndex`].
///
/// Cloning is cheap; all clones share the index, collaborators and limiter.
#[derive(Clone)]
pub struct RetrievalEngine {
    index: SharedIndex,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    limiter: InferenceLimiter,
    config: RetrievalConfig,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("index", &self.index)
            .field("model", &self.embedder.model())
            .field("reranker", &self.reranker.is_some())
            .finish_non_exhaustive()
    }
}

impl RetrievalEngine {
    pub fn new(
        index: SharedIndex,
        embedder: Arc<dyn Embedder>,
        limiter: InferenceLimiter,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            reranker: None,
            limiter,
            config,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Wire up the engine from configuration: index directory, embedder,
    /// optional reranker and inference limits. The index itself is loaded on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::Config`] if the configuration is invalid or a
    /// collaborator client cannot be created.
    pub fn from_config(config: &RagdexConfig) -> Result<Self, RagdexError> {
        config.validate()?;
        let index = SharedIndex::from_artifacts(ArtifactPaths::in_dir(&config.index.dir));
        let mut engine = Self::new(
            index,
            create_embedder(&config.embedding)?,
            InferenceLimiter::from_config(&config.runtime),
            config.retrieval.clone(),
        );
        engine.reranker = create_reranker(&config.reranker)?;
        Ok(engine)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    pub async fn health(&self) -> HealthReport {
        self.index.health().await
    }

    /// Reject malformed requests before any work is done.
    fn validate(&self, request: &SearchRequest) -> Result<(), RagdexError> {
        if request.query.trim().is_empty() {
            return Err(RagdexError::InvalidInput("query must not be empty".into()));
        }
        if request.top_k == 0 || request.top_k > self.config.max_top_k {
            return Err(RagdexError::InvalidInput(format!(
                "top_k must be between 1 and {}, got {}",
                self.config.max_top_k, request.top_k
            )));
        }
        if !request.min_score.is_finite() || request.min_score < 0.0 {
            return Err(RagdexError::InvalidInput(format!(
                "min_score must be a non-negative number, got {}",
                request.min_score
            )));
        }
        if request.use_reranker && self.reranker.is_none() {
            return Err(RagdexError::Config(
                "reranking requested but no reranker is configured (set [reranker] base_url)"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Search the index.
    ///
    /// Returns at most `top_k` results in descending score order, each chunk
    /// at most once.
    ///
    /// # Errors
    ///
    /// - [`RagdexError::InvalidInput`] for a blank query, `top_k` outside
    ///   `1..=max_top_k`, or a negative or non-finite `min_score`.
    /// - [`RagdexError::Config`] when reranking is requested without a reranker.
    /// - [`RagdexError::Unavailable`] when no index has been built.
    /// - Collaborator errors ([`RagdexError::Embedding`],
    ///   [`RagdexError::Rerank`], [`RagdexError::VectorSearch`],
    ///   [`RagdexError::Timeout`]) fail the request without touching the
    ///   shared index.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RankedChunk>, RagdexError> {
        self.validate(request)?;
        let index = self.index.get().await?;
        let query = request.query.trim();
        let top_k = request.top_k;

        let tokens = QueryTokens::parse(query, &self.config);
        let mut seen = Seen::new();
        let mut candidates = ranking::lexical_candidates(
            &index.chunks,
            &tokens,
            self.config.min_lexical_matches,
            self.config.lexical_score,
            &mut seen,
        );
        tracing::debug!(
            tokens = ?tokens.tokens,
            specific = tokens.specific.len(),
            lexical = candidates.len(),
            "lexical stage"
        );

        let query_vector = self.embed_query(query).await?;
        let multiplier = if request.use_reranker { 3 } else { 2 };
        let k = (top_k * multiplier).min(index.len());
        let neighbors = if k == 0 {
            Vec::new()
        } else {
            index.vectors.search(&query_vector, k)?
        };
        let discarded = ranking::merge_neighbors(&mut candidates, &neighbors, index.len(), &mut seen);
        if discarded > 0 {
            tracing::warn!(discarded, "vector search returned rows outside the index");
        }
        tracing::debug!(k, neighbors = neighbors.len(), candidates = candidates.len(), "vector stage");

        let mut pool = ranking::pool_by_source(&candidates, &index.chunks, top_k);
        tracing::debug!(pool = pool.len(), "pooling stage");

        if request.use_reranker {
            pool = self.rerank(query, pool, &index, top_k).await?;
            tracing::debug!(pool = pool.len(), "rerank stage");
        }

        let selected = ranking::diversify(&pool, &index.chunks, top_k);
        let results = ranking::apply_threshold(selected, request.min_score);
        tracing::debug!(results = results.len(), min_score = request.min_score, "search done");

        Ok(results
            .into_iter()
            .map(|c| to_ranked(&index, c))
            .collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagdexError> {
        let texts = [query.to_string()];
        let rows = self
            .limiter
            .run("query embedding", self.embedder.embed(&texts))
            .await?;
        let mut vector = rows
            .into_iter()
            .next()
            .ok_or_else(|| RagdexError::Embedding("no embedding returned for query".into()))?;
        l2_normalize(&mut vector);
        Ok(vector)
    }

    async fn rerank(
        &self,
        query: &str,
        mut pool: Vec<Candidate>,
        index: &LoadedIndex,
        top_k: usize,
    ) -> Result<Vec<Candidate>, RagdexError> {
        let Some(reranker) = &self.reranker else {
            return Ok(pool);
        };
        if pool.is_empty() {
            return Ok(pool);
        }

        let texts: Vec<String> = pool
            .iter()
            .map(|c| {
                ranking::truncate_chars(&index.chunks[c.position].text, self.config.rerank_max_chars)
                    .to_string()
            })
            .collect();
        let raw = self
            .limiter
            .run("reranking", reranker.score(query, &texts))
            .await?;
        if raw.len() != pool.len() {
            return Err(RagdexError::Rerank(format!(
                "sent {} candidates but received {} scores",
                pool.len(),
                raw.len()
            )));
        }

        for (candidate, score) in pool.iter_mut().zip(raw) {
            candidate.score = self.config.calibration.apply(score);
        }
        ranking::sort_by_score(&mut pool);
        pool.truncate(top_k * 3);
        Ok(pool)
    }
}

fn to_ranked(index: &LoadedIndex, candidate: Candidate) -> RankedChunk {
    let chunk = &index.chunks[candidate.position];
    RankedChunk {
        text: chunk.text.clone(),
        score: candidate.score,
        source: chunk.source_label().to_string(),
        doc_id: chunk.doc_id.clone(),
        section: chunk.section.clone(),
        position: candidate.position,
    }
}
