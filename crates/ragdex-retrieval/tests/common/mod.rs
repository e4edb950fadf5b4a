#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragdex_core::{Chunk, IndexMeta, RagdexError, RetrievalConfig};
use ragdex_retrieval::embedding::l2_normalize;
use ragdex_retrieval::{Embedder, InferenceLimiter, LoadedIndex, Reranker, RetrievalEngine, SharedIndex};
use ragdex_store::FlatIpIndex;

/// Embeds text as `[0.1, count(axis_1), count(axis_2), ...]`, normalized.
///
/// The small constant component keeps every vector non-zero, so a query with
/// none of the axis words is equally (and weakly) similar to every chunk with
/// none of them, and less similar to chunks that have many.
pub struct KeywordEmbedder {
    pub axes: Vec<&'static str>,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(axes: &[&'static str]) -> Self {
        Self {
            axes: axes.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn dim(&self) -> usize {
        self.axes.len() + 1
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v = vec![0.1];
        v.extend(self.axes.iter().map(|axis| lower.matches(axis).count() as f32));
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagdexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model(&self) -> &str {
        "keyword-axis"
    }
}

/// Fails the first `failures` calls, then delegates.
pub struct FlakyEmbedder {
    pub inner: KeywordEmbedder,
    pub failures: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagdexError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RagdexError::Embedding("model server returned 503".into()));
        }
        self.inner.embed(texts).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

/// Never answers within any reasonable deadline.
pub struct SlowEmbedder;

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagdexError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    fn model(&self) -> &str {
        "slow"
    }
}

/// Returns a fixed number of rows regardless of input.
pub struct WrongCountEmbedder {
    pub rows: usize,
    pub dim: usize,
}

#[async_trait]
impl Embedder for WrongCountEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagdexError> {
        Ok(vec![vec![1.0; self.dim]; self.rows])
    }

    fn model(&self) -> &str {
        "wrong-count"
    }
}

/// Scores a text `logit` for each configured word it contains, and records
/// the longest text it was sent.
pub struct ScriptedReranker {
    pub boosts: Vec<(&'static str, f32)>,
    pub longest_text: Mutex<usize>,
}

impl ScriptedReranker {
    pub fn new(boosts: &[(&'static str, f32)]) -> Self {
        Self {
            boosts: boosts.to_vec(),
            longest_text: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Reranker for ScriptedReranker {
    async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, RagdexError> {
        let mut longest = self.longest_text.lock().unwrap();
        Ok(texts
            .iter()
            .map(|text| {
                *longest = (*longest).max(text.chars().count());
                let lower = text.to_lowercase();
                self.boosts
                    .iter()
                    .filter(|(word, _)| lower.contains(word))
                    .map(|(_, logit)| logit)
                    .sum::<f32>()
                    - 1.0
            })
            .collect())
    }
}

pub fn chunk(source: &str, chunk_index: usize, text: &str) -> Chunk {
    Chunk {
        doc_id: source.split('.').next().unwrap_or(source).into(),
        chunk_index,
        text: text.into(),
        source_path: format!("/data/{source}"),
        section: String::new(),
    }
}

pub fn loaded_index(chunks: Vec<Chunk>, embedder: &KeywordEmbedder) -> LoadedIndex {
    let rows: Vec<Vec<f32>> = chunks.iter().map(|c| embedder.vector(&c.text)).collect();
    let meta = IndexMeta {
        source_docs: Vec::new(),
        model_name: "keyword-axis".into(),
        dim: embedder.dim(),
        built_at: None,
    };
    let vectors = FlatIpIndex::from_rows(embedder.dim(), &rows).unwrap();
    LoadedIndex::new(meta, chunks, Box::new(vectors)).unwrap()
}

pub fn limiter() -> InferenceLimiter {
    InferenceLimiter::new(4, Duration::from_secs(5))
}

pub fn engine_over(chunks: Vec<Chunk>, axes: &[&'static str]) -> RetrievalEngine {
    let embedder = Arc::new(KeywordEmbedder::new(axes));
    let index = loaded_index(chunks, &embedder);
    RetrievalEngine::new(
        SharedIndex::preloaded(index),
        embedder,
        limiter(),
        RetrievalConfig::default(),
    )
}
