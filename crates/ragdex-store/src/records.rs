use std::collections::HashMap;

use ragdex_core::{Chunk, IndexMeta, RagdexError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Tolerance for treating an embedding row as unit length.
const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// The self-describing record dump: chunk records, build metadata and the
/// embedding matrix, row `i` belonging to `chunks[i]`.
///
/// # Examples
///
/// ```
/// use ragdex_core::{Chunk, IndexMeta};
/// use ragdex_store::RecordDump;
///
/// let meta = IndexMeta { source_docs: vec!["a.txt".into()], model_name: "m".into(), dim: 2, built_at: None };
/// let chunk = Chunk {
///     doc_id: "a".into(), chunk_index: 0, text: "hello".into(),
///     source_path: "a.txt".into(), section: String::new(),
/// };
/// let dump = RecordDump::new(meta, vec![chunk], vec![vec![1.0, 0.0]]);
/// assert_eq!(dump.num_chunks, 1);
/// assert!(dump.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDump {
    pub meta: IndexMeta,
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Vec<f32>>,
    pub dim: usize,
    pub num_chunks: usize,
    /// Hex SHA-256 of the embedding matrix, shared with the vector file.
    #[serde(default)]
    pub fingerprint: String,
}

impl RecordDump {
    /// Assemble a dump, deriving `dim`, `num_chunks` and the fingerprint.
    pub fn new(meta: IndexMeta, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Self {
        let dim = meta.dim;
        let fingerprint = hex(&fingerprint(dim, &embeddings));
        Self {
            meta,
            num_chunks: chunks.len(),
            chunks,
            embeddings,
            dim,
            fingerprint,
        }
    }

    /// Check the positional-parallelism invariants of the dump.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::StructuralMismatch`] when counts or shapes
    /// disagree, a chunk is blank, chunk indices within a document are not
    /// `0..n-1` in order, or the stored fingerprint does not match the matrix.
    pub fn validate(&self) -> Result<(), RagdexError> {
        if self.num_chunks != self.chunks.len() {
            return Err(mismatch(format!(
                "num_chunks is {} but {} chunk records are stored",
                self.num_chunks,
                self.chunks.len()
            )));
        }
        if self.embeddings.len() != self.chunks.len() {
            return Err(mismatch(format!(
                "{} chunk records but {} embedding rows",
                self.chunks.len(),
                self.embeddings.len()
            )));
        }
        if self.dim == 0 {
            return Err(mismatch("embedding dimension is 0".into()));
        }
        if self.meta.dim != self.dim {
            return Err(mismatch(format!(
                "meta.dim is {} but dim is {}",
                self.meta.dim, self.dim
            )));
        }
        if let Some((row, len)) = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r.len()))
            .find(|&(_, len)| len != self.dim)
        {
            return Err(mismatch(format!(
                "embedding row {row} has {len} columns, expected {}",
                self.dim
            )));
        }

        let mut next_index: HashMap<&str, usize> = HashMap::new();
        for (position, chunk) in self.chunks.iter().enumerate() {
            if chunk.text.trim().is_empty() {
                return Err(mismatch(format!("chunk at position {position} is blank")));
            }
            let expected = next_index.entry(chunk.doc_id.as_str()).or_insert(0);
            if chunk.chunk_index != *expected {
                return Err(mismatch(format!(
                    "chunk at position {position} of '{}' has chunk_index {}, expected {}",
                    chunk.doc_id, chunk.chunk_index, expected
                )));
            }
            *expected += 1;
        }

        let computed = hex(&fingerprint(self.dim, &self.embeddings));
        if !self.fingerprint.is_empty() && self.fingerprint != computed {
            return Err(mismatch(
                "record dump fingerprint does not match its embeddings".into(),
            ));
        }

        let off_unit = self
            .embeddings
            .iter()
            .filter(|row| (l2_norm(row) - 1.0).abs() > UNIT_NORM_TOLERANCE)
            .count();
        if off_unit > 0 {
            tracing::warn!(
                rows = off_unit,
                "embedding rows are not unit length; inner product will not equal cosine"
            );
        }

        Ok(())
    }
}

/// SHA-256 over the matrix shape and its little-endian `f32` values.
pub fn fingerprint(dim: usize, rows: &[Vec<f32>]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update((dim as u64).to_le_bytes());
    hasher.update((rows.len() as u64).to_le_bytes());
    for row in rows {
        for value in row {
            hasher.update(value.to_le_bytes());
        }
    }
    hasher.finalize().into()
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn l2_norm(row: &[f32]) -> f32 {
    row.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn mismatch(msg: String) -> RagdexError {
    RagdexError::StructuralMismatch(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc_id: &str, chunk_index: usize, text: &str) -> Chunk {
        Chunk {
            doc_id: doc_id.into(),
            chunk_index,
            text: text.into(),
            source_path: format!("{doc_id}.txt"),
            section: String::new(),
        }
    }

    fn meta(dim: usize) -> IndexMeta {
        IndexMeta {
            source_docs: vec!["a.txt".into(), "b.txt".into()],
            model_name: "test-model".into(),
            dim,
            built_at: None,
        }
    }

    fn valid_dump() -> RecordDump {
        RecordDump::new(
            meta(2),
            vec![chunk("a", 0, "first"), chunk("b", 0, "other"), chunk("a", 1, "second")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]],
        )
    }

    #[test]
    fn valid_dump_passes() {
        let dump = valid_dump();
        assert_eq!(dump.num_chunks, 3);
        assert_eq!(dump.fingerprint.len(), 64);
        dump.validate().unwrap();
    }

    #[test]
    fn count_disagreement_is_mismatch() {
        let mut dump = valid_dump();
        dump.num_chunks = 4;
        assert!(matches!(dump.validate(), Err(RagdexError::StructuralMismatch(_))));

        let mut dump = valid_dump();
        dump.embeddings.pop();
        assert!(matches!(dump.validate(), Err(RagdexError::StructuralMismatch(_))));
    }

    #[test]
    fn ragged_row_is_mismatch() {
        let mut dump = valid_dump();
        dump.embeddings[1] = vec![1.0];
        dump.fingerprint.clear();
        let err = dump.validate().unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn meta_dim_must_agree() {
        let mut dump = valid_dump();
        dump.meta.dim = 3;
        assert!(matches!(dump.validate(), Err(RagdexError::StructuralMismatch(_))));
    }

    #[test]
    fn chunk_index_gap_is_mismatch() {
        let mut dump = valid_dump();
        dump.chunks[2].chunk_index = 2;
        let err = dump.validate().unwrap_err();
        assert!(err.to_string().contains("expected 1"));
    }

    #[test]
    fn blank_chunk_is_mismatch() {
        let mut dump = valid_dump();
        dump.chunks[0].text = "   ".into();
        assert!(matches!(dump.validate(), Err(RagdexError::StructuralMismatch(_))));
    }

    #[test]
    fn tampered_embeddings_fail_fingerprint() {
        let mut dump = valid_dump();
        dump.embeddings[0][0] = 0.5;
        let err = dump.validate().unwrap_err();
        assert!(err.to_string().contains("fingerprint"));
    }

    #[test]
    fn fingerprint_depends_on_shape() {
        let rows = vec![vec![1.0, 0.0, 0.0, 1.0]];
        let split = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_ne!(fingerprint(4, &rows), fingerprint(2, &split));
    }
}
