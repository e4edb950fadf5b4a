mod common;

use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use ragdex_core::{
    Chunk, HealthStatus, IndexMeta, RagdexError, RankedChunk, RetrievalConfig, SearchRequest,
};
use ragdex_retrieval::{InferenceLimiter, LoadedIndex, RetrievalEngine, SharedIndex};
use ragdex_store::{ArtifactPaths, Neighbor, VectorSearch};

const AXES: &[&str] = &["budget", "river", "music"];

fn corpus() -> Vec<Chunk> {
    vec![
        chunk(
            "cv.txt",
            0,
            "Glazunov Anatoly Alekseevich, doctor of music, wrote about river music",
        ),
        chunk("report.txt", 0, "budget overview for the year"),
        chunk("report.txt", 1, "budget lines and budget totals"),
        chunk("notes.txt", 0, "meeting notes about the budget"),
        chunk("notes.txt", 1, "river trip photos"),
        chunk("misc.txt", 0, "music playlist"),
    ]
}

fn assert_well_formed(results: &[RankedChunk], top_k: usize) {
    assert!(results.len() <= top_k);
    let positions: HashSet<usize> = results.iter().map(|r| r.position).collect();
    assert_eq!(positions.len(), results.len(), "duplicate chunk in results");
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results not in descending order");
    }
}

#[tokio::test]
async fn lexical_match_rescues_exact_entity() {
    let engine = engine_over(corpus(), AXES);
    let request = SearchRequest::new("Glazunov Anatoly").with_top_k(2);

    let results = engine.search(&request).await.unwrap();
    assert_well_formed(&results, 2);

    // Chunk 0 has the lowest cosine similarity in the corpus, so the vector
    // stage alone never returns it for top_k = 2.
    assert_eq!(results[0].position, 0);
    assert_eq!(results[0].source, "cv.txt");
    assert!((results[0].score - 0.80).abs() < 1e-6);
    assert!(results[0].text.starts_with("Glazunov Anatoly Alekseevich"));
}

#[tokio::test]
async fn stop_word_query_runs_vector_path() {
    let engine = engine_over(corpus(), AXES);
    let results = engine.search(&SearchRequest::new("кто это")).await.unwrap();
    assert!(!results.is_empty());
    assert_well_formed(&results, 5);
}

#[tokio::test]
async fn results_never_repeat_a_chunk() {
    let engine = engine_over(corpus(), AXES);
    for query in ["budget river music", "budget totals", "river photos", "music"] {
        for top_k in [1, 3, 5, 20] {
            let request = SearchRequest::new(query).with_top_k(top_k);
            let results = engine.search(&request).await.unwrap();
            assert_well_formed(&results, top_k);
        }
    }
}

#[tokio::test]
async fn diversification_spreads_results_across_sources() {
    let chunks = vec![
        chunk("a.txt", 0, "budget budget forecast"),
        chunk("a.txt", 1, "budget budget actuals"),
        chunk("a.txt", 2, "budget budget variance"),
        chunk("b.txt", 0, "budget and river levels"),
    ];
    let engine = engine_over(chunks, AXES);
    let results = engine
        .search(&SearchRequest::new("budget").with_top_k(2))
        .await
        .unwrap();

    let sources: HashSet<&str> = results.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(results.len(), 2);
    assert!(sources.contains("a.txt"));
    assert!(sources.contains("b.txt"));
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn threshold_filters_and_is_monotonic() {
    let engine = engine_over(corpus(), AXES);
    let mut previous = usize::MAX;
    for min_score in [0.0, 0.05, 0.5, 0.9] {
        let request = SearchRequest::new("Glazunov Anatoly river")
            .with_top_k(5)
            .with_min_score(min_score);
        let results = engine.search(&request).await.unwrap();
        assert!(results.iter().all(|r| r.score >= min_score));
        assert!(results.len() <= previous);
        previous = results.len();
    }
}

#[tokio::test]
async fn min_score_above_one_returns_nothing() {
    let engine = engine_over(corpus(), AXES);
    for query in ["Glazunov Anatoly", "budget", "кто это"] {
        let request = SearchRequest::new(query).with_min_score(1.01);
        assert!(engine.search(&request).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let engine = engine_over(corpus(), AXES);
    let cases = [
        SearchRequest::new("   "),
        SearchRequest::new("budget").with_top_k(0),
        SearchRequest::new("budget").with_top_k(21),
        SearchRequest::new("budget").with_min_score(-0.1),
        SearchRequest::new("budget").with_min_score(f32::NAN),
    ];
    for request in cases {
        let err = engine.search(&request).await.unwrap_err();
        assert!(matches!(err, RagdexError::InvalidInput(_)), "{request:?}: {err}");
    }

    let err = engine
        .search(&SearchRequest::new("budget").with_reranker(true))
        .await
        .unwrap_err();
    assert!(matches!(err, RagdexError::Config(_)));
}

#[tokio::test]
async fn input_errors_take_precedence_over_missing_index() {
    let dir = tempfile::tempdir().unwrap();
    let engine = RetrievalEngine::new(
        SharedIndex::from_artifacts(ArtifactPaths::in_dir(dir.path())),
        Arc::new(KeywordEmbedder::new(AXES)),
        limiter(),
        RetrievalConfig::default(),
    );

    let err = engine.search(&SearchRequest::new("")).await.unwrap_err();
    assert!(matches!(err, RagdexError::InvalidInput(_)));

    let err = engine.search(&SearchRequest::new("budget")).await.unwrap_err();
    assert!(matches!(err, RagdexError::Unavailable(_)));
    assert_eq!(engine.health().await.status, HealthStatus::Unavailable);
}

#[tokio::test]
async fn embedder_failure_leaves_index_usable() {
    let flaky = Arc::new(FlakyEmbedder {
        inner: KeywordEmbedder::new(AXES),
        failures: AtomicUsize::new(1),
    });
    let index = loaded_index(corpus(), &flaky.inner);
    let engine = RetrievalEngine::new(
        SharedIndex::preloaded(index),
        flaky,
        limiter(),
        RetrievalConfig::default(),
    );
    let request = SearchRequest::new("Glazunov Anatoly").with_top_k(2);

    let err = engine.search(&request).await.unwrap_err();
    assert!(matches!(err, RagdexError::Embedding(_)));
    assert!(err.is_retryable());

    let results = engine.search(&request).await.unwrap();
    assert_eq!(results[0].position, 0);
    assert!(engine.health().await.is_ready());
}

#[tokio::test]
async fn slow_embedder_times_out() {
    let index = loaded_index(corpus(), &KeywordEmbedder::new(AXES));
    let engine = RetrievalEngine::new(
        SharedIndex::preloaded(index),
        Arc::new(SlowEmbedder),
        InferenceLimiter::new(1, Duration::from_millis(20)),
        RetrievalConfig::default(),
    );

    let err = engine.search(&SearchRequest::new("budget")).await.unwrap_err();
    assert!(matches!(
        err,
        RagdexError::Timeout {
            operation: "query embedding",
            ..
        }
    ));
}

#[tokio::test]
async fn reranker_rescores_with_logistic_calibration() {
    let mut chunks = corpus();
    chunks.push(chunk("long.txt", 0, &"river ".repeat(200)));
    let embedder = Arc::new(KeywordEmbedder::new(AXES));
    let index = loaded_index(chunks, &embedder);
    let reranker = Arc::new(ScriptedReranker::new(&[("river", 4.0)]));
    let engine = RetrievalEngine::new(
        SharedIndex::preloaded(index),
        embedder,
        limiter(),
        RetrievalConfig::default(),
    )
    .with_reranker(reranker.clone());

    let request = SearchRequest::new("river photos").with_top_k(2).with_reranker(true);
    let results = engine.search(&request).await.unwrap();

    assert_well_formed(&results, 2);
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.score > 0.0 && r.score < 1.0));
    assert!(results[0].text.to_lowercase().contains("river"));
    let expected = 1.0 / (1.0 + (-3.0f32).exp());
    assert!((results[0].score - expected).abs() < 1e-5);
    assert_eq!(*reranker.longest_text.lock().unwrap(), 512);
}

struct JunkRows {
    rows: usize,
}

impl VectorSearch for JunkRows {
    fn len(&self) -> usize {
        self.rows
    }

    fn dim(&self) -> usize {
        AXES.len() + 1
    }

    fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<Neighbor>, RagdexError> {
        Ok(vec![
            Neighbor { score: 0.9, row: 99 },
            Neighbor { score: 0.7, row: -1 },
            Neighbor { score: 0.5, row: 1 },
        ])
    }
}

#[tokio::test]
async fn out_of_range_rows_are_ignored() {
    let chunks = corpus();
    let meta = IndexMeta {
        source_docs: Vec::new(),
        model_name: "keyword-axis".into(),
        dim: AXES.len() + 1,
        built_at: None,
    };
    let rows = chunks.len();
    let index = LoadedIndex::new(meta, chunks, Box::new(JunkRows { rows })).unwrap();
    let engine = RetrievalEngine::new(
        SharedIndex::preloaded(index),
        Arc::new(KeywordEmbedder::new(AXES)),
        limiter(),
        RetrievalConfig::default(),
    );

    let results = engine.search(&SearchRequest::new("budget")).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].position, 1);
    assert_eq!(results[0].score, 0.5);
}

#[tokio::test]
async fn query_dimension_mismatch_is_vector_search_error() {
    let index = loaded_index(corpus(), &KeywordEmbedder::new(AXES));
    let engine = RetrievalEngine::new(
        SharedIndex::preloaded(index),
        Arc::new(KeywordEmbedder::new(&["budget"])),
        limiter(),
        RetrievalConfig::default(),
    );
    let err = engine.search(&SearchRequest::new("budget")).await.unwrap_err();
    assert!(matches!(err, RagdexError::VectorSearch(_)));
}

#[tokio::test]
async fn tuned_constants_are_configurable() {
    let embedder = Arc::new(KeywordEmbedder::new(AXES));
    let index = loaded_index(corpus(), &embedder);
    let config = RetrievalConfig {
        lexical_score: 0.65,
        ..RetrievalConfig::default()
    };
    let engine = RetrievalEngine::new(SharedIndex::preloaded(index), embedder, limiter(), config);

    let results = engine
        .search(&SearchRequest::new("Glazunov Anatoly").with_top_k(2))
        .await
        .unwrap();
    assert!((results[0].score - 0.65).abs() < 1e-6);
}
