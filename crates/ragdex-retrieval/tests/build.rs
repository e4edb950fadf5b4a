mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use ragdex_chunker::Document;
use ragdex_core::{ChunkingConfig, RagdexError, RetrievalConfig, SearchRequest};
use ragdex_retrieval::{build_index, BuildParams, RetrievalEngine, SharedIndex};
use ragdex_store::{load_index, ArtifactPaths};

const AXES: &[&str] = &["budget", "river", "music"];

fn documents() -> Vec<Document> {
    vec![
        Document::from_text(
            "docs/thesis.txt",
            "Glazunov Anatoly Alekseevich, doctor of technical sciences.\n\n\
             His research covers river hydrology and water budget models.",
        ),
        Document::from_text(
            "docs/finance.md",
            "# Finance\n\nThe annual budget was approved in March.\n\n\
             Music festival sponsorship is funded from the events budget.",
        ),
    ]
}

fn params(batch_size: usize) -> BuildParams {
    BuildParams {
        chunking: ChunkingConfig {
            max_chars: 80,
            overlap_chars: 0,
            min_chunk_chars: 10,
        },
        batch_size,
    }
}

#[tokio::test]
async fn build_persists_a_loadable_index() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let embedder = KeywordEmbedder::new(AXES);
    let mut progress = Vec::new();

    let report = build_index(&documents(), &embedder, &params(2), &paths, |done, total| {
        progress.push((done, total))
    })
    .await
    .unwrap();

    assert_eq!(report.documents, 2);
    assert_eq!(report.dim, AXES.len() + 1);
    assert!(report.chunks >= 4);
    assert_eq!(progress.last(), Some(&(report.chunks, report.chunks)));
    assert_eq!(
        embedder.calls.load(Ordering::SeqCst),
        report.chunks.div_ceil(2)
    );

    let stored = load_index(&paths).unwrap();
    assert_eq!(stored.num_chunks(), report.chunks);
    assert_eq!(stored.meta.model_name, "keyword-axis");
    assert_eq!(stored.meta.source_docs, vec!["docs/thesis.txt", "docs/finance.md"]);
    assert!(stored.meta.built_at.is_some());

    let finance: Vec<usize> = stored
        .chunks
        .iter()
        .filter(|c| c.doc_id == "finance")
        .map(|c| c.chunk_index)
        .collect();
    assert_eq!(finance, (0..finance.len()).collect::<Vec<_>>());
    assert!(stored.chunks.iter().filter(|c| c.doc_id == "finance").all(|c| c.section == "Finance"));
}

#[tokio::test]
async fn built_index_serves_searches_after_earlier_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let embedder = Arc::new(KeywordEmbedder::new(AXES));
    let engine = RetrievalEngine::new(
        SharedIndex::from_artifacts(paths.clone()),
        embedder.clone(),
        limiter(),
        RetrievalConfig::default(),
    );
    let request = SearchRequest::new("кто такой Glazunov Anatoly").with_top_k(3);

    let err = engine.search(&request).await.unwrap_err();
    assert!(matches!(err, RagdexError::Unavailable(_)));

    build_index(&documents(), embedder.as_ref(), &params(8), &paths, |_, _| {})
        .await
        .unwrap();

    let results = engine.search(&request).await.unwrap();
    assert!(engine.index().is_loaded());
    assert_eq!(results[0].source, "thesis.txt");
    assert!(results[0].text.contains("Glazunov"));
    assert!((results[0].score - 0.80).abs() < 1e-6);
}

#[tokio::test]
async fn concurrent_first_access_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let embedder = KeywordEmbedder::new(AXES);
    build_index(&documents(), &embedder, &params(8), &paths, |_, _| {})
        .await
        .unwrap();

    let shared = SharedIndex::from_artifacts(paths);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let shared = shared.clone();
            tokio::spawn(async move { shared.get().await.unwrap() })
        })
        .collect();

    let mut loaded = Vec::new();
    for handle in handles {
        loaded.push(handle.await.unwrap());
    }
    assert!(loaded.iter().all(|index| Arc::ptr_eq(index, &loaded[0])));
}

#[tokio::test]
async fn no_documents_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let embedder = KeywordEmbedder::new(AXES);

    let err = build_index(&[], &embedder, &params(8), &paths, |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(err, RagdexError::InvalidInput(_)));

    let blank = vec![Document::from_text("empty.txt", " \n\n\t ")];
    let err = build_index(&blank, &embedder, &params(8), &paths, |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(err, RagdexError::InvalidInput(_)));
    assert!(!paths.exist());
}

#[tokio::test]
async fn embedder_row_count_mismatch_fails_build() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let embedder = WrongCountEmbedder { rows: 1, dim: 4 };

    let err = build_index(&documents(), &embedder, &params(8), &paths, |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(err, RagdexError::Embedding(_)));
    assert!(!paths.exist());
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_index() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let embedder = KeywordEmbedder::new(AXES);
    let first = build_index(&documents(), &embedder, &params(8), &paths, |_, _| {})
        .await
        .unwrap();

    let broken = WrongCountEmbedder { rows: 0, dim: 4 };
    assert!(build_index(&documents(), &broken, &params(8), &paths, |_, _| {})
        .await
        .is_err());

    assert_eq!(load_index(&paths).unwrap().num_chunks(), first.chunks);
}

#[tokio::test]
async fn documents_with_the_same_stem_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let embedder = KeywordEmbedder::new(AXES);
    let docs = vec![
        Document::from_text(
            "archive/report.md",
            "Old river budget for the north.\n\nMusic hall repairs were deferred.",
        ),
        Document::from_text(
            "current/report.md",
            "New river budget for the south.\n\nMusic hall repairs are finished.",
        ),
    ];
    let params = BuildParams {
        chunking: ChunkingConfig {
            max_chars: 40,
            overlap_chars: 0,
            min_chunk_chars: 5,
        },
        batch_size: 8,
    };

    let report = build_index(&docs, &embedder, &params, &paths, |_, _| {})
        .await
        .unwrap();
    assert_eq!(report.documents, 2);

    let stored = load_index(&paths).unwrap();
    for (doc_id, source) in [("report", "archive/report.md"), ("report-2", "current/report.md")] {
        let chunks: Vec<_> = stored.chunks.iter().filter(|c| c.doc_id == doc_id).collect();
        assert_eq!(chunks.len(), 2, "{doc_id}");
        assert!(chunks.iter().all(|c| c.source_path == source));
        let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }
}
