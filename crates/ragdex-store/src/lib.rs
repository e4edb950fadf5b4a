//! Persistence for built indexes.
//!
//! An index is stored as two artifacts that must always travel together:
//! a human-inspectable JSON record dump (chunks, metadata and the embedding
//! matrix) and a compact binary vector file used for similarity search. Both
//! are keyed by row position and bound to each other by a SHA-256 fingerprint
//! of the embedding matrix, so a mismatched pair is rejected at load time.

pub mod lookup;
pub mod records;
pub mod store;
pub mod vector;

pub use lookup::{find_substring, LookupMatch};
pub use records::RecordDump;
pub use store::{load_index, save_index, ArtifactPaths, StoredIndex, RECORDS_FILE, VECTORS_FILE};
pub use vector::{FlatIpIndex, Neighbor, VectorFile, VectorSearch};
