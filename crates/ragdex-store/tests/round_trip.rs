use std::fs;

use chrono::Utc;
use ragdex_core::{Chunk, IndexMeta, RagdexError};
use ragdex_store::{load_index, save_index, ArtifactPaths, VectorSearch};

fn chunk(doc_id: &str, chunk_index: usize, text: &str) -> Chunk {
    Chunk {
        doc_id: doc_id.into(),
        chunk_index,
        text: text.into(),
        source_path: format!("docs/{doc_id}.txt"),
        section: "Heading".into(),
    }
}

fn sample() -> (IndexMeta, Vec<Chunk>, Vec<Vec<f32>>) {
    let meta = IndexMeta {
        source_docs: vec!["docs/cv.txt".into(), "docs/report.txt".into()],
        model_name: "paraphrase-multilingual-mpnet-base-v2".into(),
        dim: 3,
        built_at: Some(Utc::now()),
    };
    let chunks = vec![
        chunk("cv", 0, "Глазунов Анатолий Алексеевич, доктор наук"),
        chunk("cv", 1, "Публикации и патенты"),
        chunk("report", 0, "Annual report, section one"),
    ];
    let embeddings = vec![
        vec![1.0, 0.0, 0.0],
        vec![0.0, 0.6, 0.8],
        vec![0.577_350_26, 0.577_350_26, 0.577_350_26],
    ];
    (meta, chunks, embeddings)
}

#[test]
fn save_then_load_reproduces_index() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(&dir.path().join("output"));
    let (meta, chunks, embeddings) = sample();

    save_index(&paths, meta.clone(), chunks.clone(), embeddings.clone()).unwrap();
    assert!(paths.exist());

    let loaded = load_index(&paths).unwrap();
    assert_eq!(loaded.meta, meta);
    assert_eq!(loaded.chunks, chunks);
    assert_eq!(loaded.embeddings, embeddings);
    assert_eq!(loaded.vectors.len(), 3);
    assert_eq!(loaded.vectors.rows(), embeddings);
}

#[test]
fn loaded_vectors_are_searchable_by_row() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let (meta, chunks, embeddings) = sample();
    save_index(&paths, meta, chunks, embeddings).unwrap();

    let loaded = load_index(&paths).unwrap();
    let hits = loaded.vectors.search(&[0.0, 0.6, 0.8], 1).unwrap();
    assert_eq!(hits[0].row, 1);
    assert_eq!(loaded.chunks[1].text, "Публикации и патенты");
}

#[test]
fn record_dump_is_inspectable_json() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let (meta, chunks, embeddings) = sample();
    save_index(&paths, meta, chunks, embeddings).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.records).unwrap()).unwrap();
    assert_eq!(json["num_chunks"], 3);
    assert_eq!(json["dim"], 3);
    assert_eq!(json["meta"]["model_name"], "paraphrase-multilingual-mpnet-base-v2");
    assert_eq!(json["chunks"][0]["doc_id"], "cv");
    assert_eq!(json["embeddings"].as_array().unwrap().len(), 3);
}

#[test]
fn missing_vector_artifact_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let (meta, chunks, embeddings) = sample();
    save_index(&paths, meta, chunks, embeddings).unwrap();
    fs::remove_file(&paths.vectors).unwrap();

    let err = load_index(&paths).unwrap_err();
    assert!(matches!(err, RagdexError::Unavailable(_)));
}

#[test]
fn vector_artifact_from_other_build_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let first = ArtifactPaths::in_dir(&dir.path().join("first"));
    let second = ArtifactPaths::in_dir(&dir.path().join("second"));

    let (meta, chunks, embeddings) = sample();
    save_index(&first, meta.clone(), chunks.clone(), embeddings.clone()).unwrap();

    let mut swapped = embeddings;
    swapped.swap(0, 1);
    save_index(&second, meta, chunks, swapped).unwrap();

    fs::copy(&second.vectors, &first.vectors).unwrap();
    let err = load_index(&first).unwrap_err();
    assert!(matches!(err, RagdexError::StructuralMismatch(_)));
}

#[test]
fn truncated_record_dump_is_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let (meta, chunks, embeddings) = sample();
    save_index(&paths, meta, chunks, embeddings).unwrap();

    let mut json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.records).unwrap()).unwrap();
    json["chunks"].as_array_mut().unwrap().pop();
    fs::write(&paths.records, serde_json::to_vec(&json).unwrap()).unwrap();

    let err = load_index(&paths).unwrap_err();
    assert!(matches!(err, RagdexError::StructuralMismatch(_)));
    assert!(!err.is_retryable());
}

#[test]
fn resave_replaces_previous_index() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let (meta, chunks, embeddings) = sample();
    save_index(&paths, meta.clone(), chunks.clone(), embeddings.clone()).unwrap();

    let fewer_chunks = chunks[..2].to_vec();
    let fewer_rows = embeddings[..2].to_vec();
    save_index(&paths, meta, fewer_chunks, fewer_rows).unwrap();

    let loaded = load_index(&paths).unwrap();
    assert_eq!(loaded.num_chunks(), 2);
    assert!(!dir.path().join("index.json.tmp").exists());
    assert!(!dir.path().join("index.vec.tmp").exists());
}
