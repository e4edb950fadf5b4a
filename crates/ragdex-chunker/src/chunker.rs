//! Paragraph-first chunking with word-aligned overlap.
//!
//! All lengths are measured in characters, not bytes, so Cyrillic and Latin
//! text are bounded the same way.

use std::sync::LazyLock;

use ragdex_core::{Chunk, ChunkingConfig};
use regex::Regex;

use crate::document::Document;

static BLOCK_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("block break pattern is valid"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence end pattern is valid"));

const BLOCK_SEPARATOR: &str = "\n\n";
const BLOCK_SEPARATOR_LEN: usize = 2;

/// Split `text` into ordered chunk texts.
///
/// Blank-line separated blocks are packed greedily while the joined chunk stays
/// within `max_chars`. When a block does not fit, the buffer is flushed and the
/// next buffer is seeded with the word-aligned tail (`overlap_chars`) of the
/// flushed one. Blocks longer than `max_chars` are split on sentence boundaries
/// instead, without overlap. A flushed chunk shorter than `min_chunk_chars` is
/// dropped unless it would be the first chunk, so any text with non-whitespace
/// content yields at least one chunk.
///
/// # Examples
///
/// ```
/// use ragdex_core::ChunkingConfig;
/// use ragdex_chunker::chunk_text;
///
/// let config = ChunkingConfig { max_chars: 60, overlap_chars: 0, min_chunk_chars: 10 };
/// let chunks = chunk_text("A short note.", &config);
/// assert_eq!(chunks, vec!["A short note.".to_string()]);
///
/// assert!(chunk_text("  \n\n\t ", &config).is_empty());
/// ```
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut packer = Packer::new(config);

    for block in BLOCK_BREAK
        .split(normalized.trim())
        .map(str::trim)
        .filter(|b| !b.is_empty())
    {
        packer.push_block(block);
    }

    packer.finish()
}

/// Chunk a loaded document into records with sequential `chunk_index` values.
///
/// # Examples
///
/// ```
/// use ragdex_core::ChunkingConfig;
/// use ragdex_chunker::{chunk_document, Document};
///
/// let doc = Document {
///     doc_id: "note".into(),
///     source_path: "notes/note.md".into(),
///     section: "Note".into(),
///     text: "# Note\n\nRemember the milk.".into(),
/// };
/// let chunks = chunk_document(&doc, &ChunkingConfig::default());
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].chunk_index, 0);
/// assert_eq!(chunks[0].section, "Note");
/// ```
pub fn chunk_document(doc: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    chunk_text(&doc.text, config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            doc_id: doc.doc_id.clone(),
            chunk_index,
            text,
            source_path: doc.source_path.clone(),
            section: doc.section.clone(),
        })
        .collect()
}

struct Packer<'a> {
    config: &'a ChunkingConfig,
    chunks: Vec<String>,
    current: Vec<String>,
    /// Character length of `current` joined with the block separator.
    current_len: usize,
}

impl<'a> Packer<'a> {
    fn new(config: &'a ChunkingConfig) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            current: Vec::new(),
            current_len: 0,
        }
    }

    fn push_block(&mut self, block: &str) {
        let block_len = char_len(block);
        if self.joined_len_with(block_len) <= self.config.max_chars {
            self.append(block.to_string(), block_len);
            return;
        }

        let overlap = self.flush();

        if block_len > self.config.max_chars {
            for part in pack_sentences(block, self.config.max_chars) {
                self.emit(part);
            }
            return;
        }

        if let Some(overlap) = overlap {
            let overlap_len = char_len(&overlap);
            // Overlap is dropped rather than pushing the chunk past max_chars.
            if overlap_len + BLOCK_SEPARATOR_LEN + block_len <= self.config.max_chars {
                self.append(overlap, overlap_len);
            }
        }
        self.append(block.to_string(), block_len);
    }

    fn joined_len_with(&self, len: usize) -> usize {
        if self.current.is_empty() {
            len
        } else {
            self.current_len + BLOCK_SEPARATOR_LEN + len
        }
    }

    fn append(&mut self, part: String, len: usize) {
        self.current_len = self.joined_len_with(len);
        self.current.push(part);
    }

    /// Emit the buffer and return the overlap seed for the next one.
    fn flush(&mut self) -> Option<String> {
        if self.current.is_empty() {
            return None;
        }
        let text = self.current.join(BLOCK_SEPARATOR);
        self.current.clear();
        self.current_len = 0;

        let overlap = overlap_tail(&text, self.config.overlap_chars);
        self.emit(text);
        overlap
    }

    fn emit(&mut self, text: String) {
        if char_len(&text) >= self.config.min_chunk_chars || self.chunks.is_empty() {
            self.chunks.push(text);
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            let text = self.current.join(BLOCK_SEPARATOR);
            self.emit(text);
        }
        self.chunks
    }
}

/// The last `overlap_chars` characters of `text`, advanced to the next word
/// start. Returns `None` when there is no word boundary to align to.
fn overlap_tail(text: &str, overlap_chars: usize) -> Option<String> {
    if overlap_chars == 0 {
        return None;
    }
    let total = char_len(text);
    if total <= overlap_chars {
        return Some(text.to_string());
    }

    let start = byte_offset(text, total - overlap_chars);
    let tail = &text[start..];
    let at_boundary = text[..start]
        .chars()
        .next_back()
        .is_some_and(char::is_whitespace)
        || tail.starts_with(char::is_whitespace);

    let aligned = if at_boundary {
        tail
    } else {
        let cut = tail.find(char::is_whitespace)?;
        &tail[cut..]
    };

    let aligned = aligned.trim();
    (!aligned.is_empty()).then(|| aligned.to_string())
}

/// Greedily pack the sentences of an oversized block into parts of at most
/// `max_chars`. A single sentence that is still too long is split on words.
fn pack_sentences(block: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut buf_len = 0;

    for sentence in split_sentences(block) {
        let len = char_len(sentence);
        if len > max_chars {
            if !buf.is_empty() {
                parts.push(buf.join(" "));
                buf.clear();
                buf_len = 0;
            }
            parts.extend(pack_words(sentence, max_chars));
            continue;
        }

        let needed = if buf.is_empty() { len } else { buf_len + 1 + len };
        if needed <= max_chars {
            buf.push(sentence);
            buf_len = needed;
        } else {
            parts.push(buf.join(" "));
            buf = vec![sentence];
            buf_len = len;
        }
    }

    if !buf.is_empty() {
        parts.push(buf.join(" "));
    }
    parts
}

/// Split on a sentence terminator followed by whitespace, keeping the
/// terminator with its sentence.
fn split_sentences(block: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(block) {
        // Terminators are single-byte ASCII.
        let sentence = block[start..m.start() + 1].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }

    let rest = block[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn pack_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0;

    for word in text.split_whitespace() {
        let len = char_len(word);
        if len > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }

        if !buf.is_empty() && buf_len + 1 + len > max_chars {
            pieces.push(std::mem::take(&mut buf));
            buf_len = 0;
        }
        if !buf.is_empty() {
            buf.push(' ');
            buf_len += 1;
        }
        buf.push_str(word);
        buf_len += len;
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(s.len())
}
