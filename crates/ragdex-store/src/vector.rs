//! The binary vector artifact and exact inner-product search over it.

use std::cmp::Ordering;

use ragdex_core::RagdexError;

use crate::records::{fingerprint, hex};

const MAGIC: &[u8; 4] = b"RDXV";
const FORMAT_VERSION: u32 = 1;
/// magic + version + dim + rows + fingerprint
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 32;

/// One nearest-neighbor hit. A `row` of `-1` means "no more results".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Inner-product similarity.
    pub score: f32,
    /// Row position in the index, or `-1`.
    pub row: i64,
}

/// A nearest-neighbor index over row-ordered vectors.
///
/// Implementations return at most `k` neighbors ordered by descending
/// similarity. Like a FAISS flat index, they may pad the result with
/// `row == -1` entries when `k` exceeds the number of stored vectors, so
/// callers must bounds-check every row.
pub trait VectorSearch: Send + Sync {
    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality of stored vectors.
    fn dim(&self) -> usize;

    /// Return up to `k` neighbors of `query` by inner product.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, RagdexError>;
}

/// Brute-force inner-product index over a row-major `f32` matrix.
///
/// # Examples
///
/// ```
/// use ragdex_store::{FlatIpIndex, VectorSearch};
///
/// let index = FlatIpIndex::from_rows(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
/// let hits = index.search(&[0.0, 1.0], 1).unwrap();
/// assert_eq!(hits[0].row, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    /// Wrap a row-major matrix.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::StructuralMismatch`] if `dim` is 0 or the data
    /// length is not a multiple of `dim`.
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self, RagdexError> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(RagdexError::StructuralMismatch(format!(
                "{} values do not form rows of dimension {dim}",
                data.len()
            )));
        }
        Ok(Self { dim, data })
    }

    /// Build from individual rows, checking every row has `dim` columns.
    pub fn from_rows(dim: usize, rows: &[Vec<f32>]) -> Result<Self, RagdexError> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(RagdexError::StructuralMismatch(format!(
                    "row {i} has {} columns, expected {dim}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(dim, data)
    }

    /// Row `i` of the matrix.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dim).nth(i)
    }

    pub fn rows(&self) -> Vec<Vec<f32>> {
        self.data.chunks_exact(self.dim).map(<[f32]>::to_vec).collect()
    }
}

impl VectorSearch for FlatIpIndex {
    fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, RagdexError> {
        if query.len() != self.dim {
            return Err(RagdexError::VectorSearch(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dim
            )));
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, v)| Neighbor {
                score: dot(query, v),
                row: row as i64,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.row.cmp(&b.row))
        });
        scored.truncate(k);
        while scored.len() < k {
            scored.push(Neighbor {
                score: f32::NEG_INFINITY,
                row: -1,
            });
        }
        Ok(scored)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// The on-disk vector artifact.
///
/// Layout (little-endian): `RDXV` magic, `u32` format version, `u32` dim,
/// `u64` row count, 32-byte SHA-256 fingerprint of the matrix, then
/// `rows * dim` `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFile {
    pub dim: usize,
    pub rows: usize,
    pub fingerprint: [u8; 32],
    pub data: Vec<f32>,
}

impl VectorFile {
    /// Build the artifact for an embedding matrix.
    pub fn from_rows(dim: usize, rows: &[Vec<f32>]) -> Self {
        Self {
            dim,
            rows: rows.len(),
            fingerprint: fingerprint(dim, rows),
            data: rows.iter().flatten().copied().collect(),
        }
    }

    pub fn fingerprint_hex(&self) -> String {
        hex(&self.fingerprint)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.rows as u64).to_le_bytes());
        bytes.extend_from_slice(&self.fingerprint);
        bytes.extend_from_slice(&floats_to_bytes(&self.data));
        bytes
    }

    /// Parse and verify a vector artifact.
    ///
    /// # Errors
    ///
    /// Returns [`RagdexError::StructuralMismatch`] for a bad magic or version,
    /// a truncated or oversized payload, or a payload whose fingerprint does
    /// not match the header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RagdexError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(RagdexError::StructuralMismatch(
                "vector file is not a ragdex vector index".into(),
            ));
        }
        let version = u32::from_le_bytes(array(&bytes[4..8]));
        if version != FORMAT_VERSION {
            return Err(RagdexError::StructuralMismatch(format!(
                "unsupported vector file version {version}"
            )));
        }
        let dim = u32::from_le_bytes(array(&bytes[8..12])) as usize;
        let rows = u64::from_le_bytes(array(&bytes[12..20])) as usize;
        let header_fingerprint: [u8; 32] = array(&bytes[20..HEADER_LEN]);

        let payload = &bytes[HEADER_LEN..];
        let expected = rows.checked_mul(dim).and_then(|n| n.checked_mul(4));
        if expected != Some(payload.len()) {
            return Err(RagdexError::StructuralMismatch(format!(
                "vector file declares {rows} rows of dimension {dim} but holds {} bytes",
                payload.len()
            )));
        }

        let data = bytes_to_floats(payload);
        let rows_vec: Vec<Vec<f32>> = if dim == 0 {
            Vec::new()
        } else {
            data.chunks_exact(dim).map(<[f32]>::to_vec).collect()
        };
        if fingerprint(dim, &rows_vec) != header_fingerprint {
            return Err(RagdexError::StructuralMismatch(
                "vector file payload does not match its fingerprint".into(),
            ));
        }

        Ok(Self {
            dim,
            rows,
            fingerprint: header_fingerprint,
            data,
        })
    }

    /// Turn the artifact into a searchable index.
    pub fn into_index(self) -> Result<FlatIpIndex, RagdexError> {
        FlatIpIndex::new(self.dim, self.data)
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    let mut floats = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        floats.push(f32::from_le_bytes(array(chunk)));
    }
    floats
}
