use ragdex_core::Chunk;

/// A chunk containing the searched substring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupMatch<'a> {
    /// Row position of the chunk in the index.
    pub position: usize,
    pub chunk: &'a Chunk,
}

/// Case-insensitive substring scan over chunk texts, in index order.
///
/// A diagnostic for checking that expected content survived extraction and
/// chunking; it has no scoring. A blank needle matches nothing.
///
/// # Examples
///
/// ```
/// use ragdex_core::Chunk;
/// use ragdex_store::find_substring;
///
/// let chunks = vec![Chunk {
///     doc_id: "cv".into(), chunk_index: 0, text: "Глазунов Анатолий Алексеевич".into(),
///     source_path: "cv.txt".into(), section: String::new(),
/// }];
/// let hits = find_substring(&chunks, "ГЛАЗУНОВ");
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].position, 0);
/// ```
pub fn find_substring<'a>(chunks: &'a [Chunk], needle: &str) -> Vec<LookupMatch<'a>> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| chunk.text.to_lowercase().contains(&needle))
        .map(|(position, chunk)| LookupMatch { position, chunk })
        .collect()
}
