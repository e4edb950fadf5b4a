//! Paragraph-aware text chunking and document loading.
//!
//! Splits raw document text into bounded, overlapping chunks: paragraphs are
//! packed greedily up to a character limit, consecutive chunks share a
//! word-aligned overlap, and paragraphs too large for a single chunk fall back
//! to sentence-level packing. The [`document`] module discovers and reads the
//! text files an index is built from.

pub mod chunker;
pub mod document;

pub use chunker::{chunk_document, chunk_text};
pub use document::{discover_documents, load_document, Document};
