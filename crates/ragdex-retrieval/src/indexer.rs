//! Offline index build: chunk, embed, persist.

use std::collections::HashSet;

use chrono::Utc;
use ragdex_chunker::{chunk_document, Document};
use ragdex_core::{Chunk, ChunkingConfig, IndexMeta, RagdexError};
use ragdex_store::{save_index, ArtifactPaths};

use crate::embedding::{l2_normalize, Embedder};

/// Parameters of a build run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildParams {
    pub chunking: ChunkingConfig,
    /// Chunk texts sent to the embedder per call.
    pub batch_size: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::build_preset(),
            batch_size: 32,
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub dim: usize,
}

/// One `doc_id` per document, in input order.
///
/// The first document with a given id keeps it; later ones get `-2`, `-3`, ...
/// appended, skipping any id already taken.
fn unique_doc_ids(docs: &[Document]) -> Vec<String> {
    let mut taken: HashSet<String> = docs.iter().map(|d| d.doc_id.clone()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    docs.iter()
        .map(|doc| {
            if seen.insert(doc.doc_id.as_str()) {
                return doc.doc_id.clone();
            }
            let mut n = 2;
            let id = loop {
                let candidate = format!("{}-{n}", doc.doc_id);
                if !taken.contains(&candidate) {
                    break candidate;
                }
                n += 1;
            };
            tracing::warn!(
                source = %doc.source_path,
                doc_id = %id,
                "duplicate document id, renamed"
            );
            taken.insert(id.clone());
            id
        })
        .collect()
}

/// Chunk `docs`, embed every chunk, and persist the index to `artifacts`.
///
/// Documents sharing a `doc_id` (same file stem in different folders) are
/// given distinct ids, see [`unique_doc_ids`].
///
/// `on_progress` is called after each embedding batch with the number of
/// chunks embedded so far and the total.
///
/// # Errors
///
/// - [`RagdexError::InvalidInput`] if there are no documents or they yield no
///   chunks.
/// - [`RagdexError::Embedding`] if the embedder fails or returns a row count
///   or dimension that disagrees with the chunks.
/// - Store errors from [`save_index`].
pub async fn build_index<F>(
    docs: &[Document],
    embedder: &dyn Embedder,
    params: &BuildParams,
    artifacts: &ArtifactPaths,
    mut on_progress: F,
) -> Result<BuildReport, RagdexError>
where
    F: FnMut(usize, usize),
{
    if docs.is_empty() {
        return Err(RagdexError::InvalidInput("no documents to index".into()));
    }
    params.chunking.validate()?;

    let chunks: Vec<Chunk> = docs
        .iter()
        .zip(unique_doc_ids(docs))
        .flat_map(|(doc, doc_id)| {
            let mut chunks = chunk_document(doc, &params.chunking);
            for chunk in &mut chunks {
                chunk.doc_id.clone_from(&doc_id);
            }
            tracing::debug!(doc = %doc_id, chunks = chunks.len(), "chunked document");
            chunks
        })
        .collect();
    if chunks.is_empty() {
        return Err(RagdexError::InvalidInput(
            "documents contain no text to index".into(),
        ));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for batch in texts.chunks(params.batch_size.max(1)) {
        let rows = embedder.embed(batch).await?;
        if rows.len() != batch.len() {
            return Err(RagdexError::Embedding(format!(
                "embedder returned {} rows for {} texts",
                rows.len(),
                batch.len()
            )));
        }
        embeddings.extend(rows);
        on_progress(embeddings.len(), texts.len());
    }

    let dim = embeddings.first().map_or(0, Vec::len);
    if dim == 0 {
        return Err(RagdexError::Embedding("embedder returned empty vectors".into()));
    }
    for (i, row) in embeddings.iter_mut().enumerate() {
        if row.len() != dim {
            return Err(RagdexError::Embedding(format!(
                "embedding {i} has {} dimensions, expected {dim}",
                row.len()
            )));
        }
        l2_normalize(row);
    }

    let meta = IndexMeta {
        source_docs: docs.iter().map(|d| d.source_path.clone()).collect(),
        model_name: embedder.model().to_string(),
        dim,
        built_at: Some(Utc::now()),
    };
    let report = BuildReport {
        documents: docs.len(),
        chunks: chunks.len(),
        dim,
    };

    save_index(artifacts, meta, chunks, embeddings)?;
    tracing::info!(
        documents = report.documents,
        chunks = report.chunks,
        dim,
        "index built"
    );
    Ok(report)
}
