use std::fs;
use std::path::{Path, PathBuf};

use ragdex_core::{Chunk, IndexMeta, RagdexError};

use crate::records::RecordDump;
use crate::vector::{FlatIpIndex, VectorFile, VectorSearch};

/// File name of the JSON record dump inside an index directory.
pub const RECORDS_FILE: &str = "index.json";
/// File name of the binary vector artifact inside an index directory.
pub const VECTORS_FILE: &str = "index.vec";

/// Locations of the two artifacts that make up a persisted index.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ragdex_store::ArtifactPaths;
///
/// let paths = ArtifactPaths::in_dir(Path::new("output"));
/// assert!(paths.records.ends_with("index.json"));
/// assert!(paths.vectors.ends_with("index.vec"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub records: PathBuf,
    pub vectors: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            records: dir.join(RECORDS_FILE),
            vectors: dir.join(VECTORS_FILE),
        }
    }

    /// Whether both artifacts are present.
    pub fn exist(&self) -> bool {
        self.records.is_file() && self.vectors.is_file()
    }
}

/// A validated index loaded from disk, read-only for its lifetime.
#[derive(Debug, Clone)]
pub struct StoredIndex {
    pub meta: IndexMeta,
    pub chunks: Vec<Chunk>,
    /// Embedding matrix from the record dump, row `i` for `chunks[i]`.
    pub embeddings: Vec<Vec<f32>>,
    /// Search structure built from the vector artifact.
    pub vectors: FlatIpIndex,
}

impl StoredIndex {
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }
}

/// Persist an index as a record dump plus a vector artifact.
///
/// Both artifacts are first written next to their final paths with a `.tmp`
/// suffix and then renamed into place, so an index that was already on disk
/// stays loadable until the new one is complete. If any write or rename
/// fails, the `.tmp` files are removed.
///
/// The two renames are not atomic as a pair. A crash between them leaves the
/// new vector artifact next to the old record dump; [`load_index`] rejects
/// that pair through the fingerprint check instead of serving mixed data.
///
/// # Errors
///
/// Returns [`RagdexError::StructuralMismatch`] if the inputs violate the
/// index invariants (nothing is written in that case) and
/// [`RagdexError::Io`] / [`RagdexError::Serialization`] on write failures.
pub fn save_index(
    paths: &ArtifactPaths,
    meta: IndexMeta,
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
) -> Result<(), RagdexError> {
    let dump = RecordDump::new(meta, chunks, embeddings);
    dump.validate()?;

    let vectors = VectorFile::from_rows(dump.dim, &dump.embeddings);
    let json = serde_json::to_vec_pretty(&dump)?;

    for path in [&paths.records, &paths.vectors] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
    }

    let records_tmp = tmp_path(&paths.records);
    let vectors_tmp = tmp_path(&paths.vectors);
    let written = fs::write(&records_tmp, json)
        .and_then(|()| fs::write(&vectors_tmp, vectors.to_bytes()))
        .and_then(|()| fs::rename(&vectors_tmp, &paths.vectors))
        .and_then(|()| fs::rename(&records_tmp, &paths.records));
    if let Err(err) = written {
        for tmp in [&records_tmp, &vectors_tmp] {
            let _ = fs::remove_file(tmp);
        }
        return Err(err.into());
    }

    tracing::info!(
        chunks = dump.num_chunks,
        dim = dump.dim,
        records = %paths.records.display(),
        vectors = %paths.vectors.display(),
        "index saved"
    );
    Ok(())
}

/// Load and cross-validate both artifacts.
///
/// # Errors
///
/// - [`RagdexError::Unavailable`] if either artifact is missing.
/// - [`RagdexError::StructuralMismatch`] if the record dump is inconsistent,
///   or the vector artifact disagrees with it on row count, dimension or
///   fingerprint.
/// - [`RagdexError::Serialization`] if the record dump is not valid JSON.
pub fn load_index(paths: &ArtifactPaths) -> Result<StoredIndex, RagdexError> {
    for path in [&paths.records, &paths.vectors] {
        if !path.is_file() {
            return Err(RagdexError::Unavailable(format!(
                "{} not found; run `ragdex build` first",
                path.display()
            )));
        }
    }

    let dump: RecordDump = serde_json::from_slice(&fs::read(&paths.records)?)?;
    dump.validate()?;

    let file = VectorFile::from_bytes(&fs::read(&paths.vectors)?)?;
    if file.rows != dump.num_chunks {
        return Err(RagdexError::StructuralMismatch(format!(
            "record dump has {} chunks but vector index has {} rows",
            dump.num_chunks, file.rows
        )));
    }
    if file.dim != dump.dim {
        return Err(RagdexError::StructuralMismatch(format!(
            "record dump has dimension {} but vector index has {}",
            dump.dim, file.dim
        )));
    }
    if !dump.fingerprint.is_empty() && file.fingerprint_hex() != dump.fingerprint {
        return Err(RagdexError::StructuralMismatch(
            "vector index was not built from this record dump".into(),
        ));
    }

    let vectors = file.into_index()?;
    tracing::info!(
        chunks = vectors.len(),
        dim = vectors.dim(),
        model = %dump.meta.model_name,
        "index loaded"
    );

    Ok(StoredIndex {
        meta: dump.meta,
        chunks: dump.chunks,
        embeddings: dump.embeddings,
        vectors,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
