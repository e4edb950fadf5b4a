//! Candidate selection stages of a search.
//!
//! Every stage is a pure function over row positions into the loaded chunk
//! list. None of them fail on empty input; an empty candidate set simply
//! flows through to an empty result.

use std::collections::{BTreeMap, HashSet};

use ragdex_core::Chunk;
use ragdex_store::Neighbor;

use crate::query::QueryTokens;

/// A chunk under consideration, identified by its row position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub position: usize,
    pub score: f32,
}

/// Per-request set of positions already added to the candidate list.
pub type Seen = HashSet<usize>;

/// Sort by descending score, keeping the existing order for ties.
pub fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Lexical stage: every chunk that matches the query tokens gets
/// `lexical_score`, in index order.
pub fn lexical_candidates(
    chunks: &[Chunk],
    tokens: &QueryTokens,
    min_matches: usize,
    lexical_score: f32,
    seen: &mut Seen,
) -> Vec<Candidate> {
    if tokens.tokens.len() < min_matches {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for (position, chunk) in chunks.iter().enumerate() {
        if tokens.matches(&chunk.text.to_lowercase(), min_matches) && seen.insert(position) {
            candidates.push(Candidate {
                position,
                score: lexical_score,
            });
        }
    }
    candidates
}

/// Vector stage: add neighbors that are in range and not already present.
///
/// Returns how many neighbors were discarded as out of range. Scores of
/// positions already seen are left untouched.
pub fn merge_neighbors(
    candidates: &mut Vec<Candidate>,
    neighbors: &[Neighbor],
    num_chunks: usize,
    seen: &mut Seen,
) -> usize {
    let mut discarded = 0;
    for neighbor in neighbors {
        let position = match usize::try_from(neighbor.row) {
            Ok(p) if p < num_chunks => p,
            _ => {
                discarded += 1;
                continue;
            }
        };
        if seen.insert(position) {
            candidates.push(Candidate {
                position,
                score: neighbor.score,
            });
        }
    }
    discarded
}

/// Group candidate positions by source label, labels in ascending order.
fn group_by_source<'a>(
    candidates: &[Candidate],
    chunks: &'a [Chunk],
) -> BTreeMap<&'a str, Vec<Candidate>> {
    let mut groups: BTreeMap<&str, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        let label = chunks[candidate.position].source_label();
        groups.entry(label).or_default().push(*candidate);
    }
    groups
}

/// Pooling stage: keep the best `top_k * 2` candidates of each source, then
/// the best `top_k * 5` overall.
pub fn pool_by_source(candidates: &[Candidate], chunks: &[Chunk], top_k: usize) -> Vec<Candidate> {
    let per_source = top_k * 2;
    let mut pool = Vec::new();
    for (_, mut group) in group_by_source(candidates, chunks) {
        sort_by_score(&mut group);
        group.truncate(per_source);
        pool.extend(group);
    }
    sort_by_score(&mut pool);
    pool.truncate(top_k * 5);
    pool
}

/// Number of distinct sources among `candidates`.
pub fn source_count(candidates: &[Candidate], chunks: &[Chunk]) -> usize {
    candidates
        .iter()
        .map(|c| chunks[c.position].source_label())
        .collect::<HashSet<_>>()
        .len()
}

/// Diversification stage.
///
/// With at least two sources and more than `top_k` candidates, sources take
/// turns (in label order) contributing their next best candidate until
/// `top_k` are selected; the selection is then ordered by score. Otherwise
/// the best `top_k` are taken. `pool` must already be sorted by score.
pub fn diversify(pool: &[Candidate], chunks: &[Chunk], top_k: usize) -> Vec<Candidate> {
    if pool.len() <= top_k || source_count(pool, chunks) < 2 {
        return pool.iter().take(top_k).copied().collect();
    }

    let groups: Vec<Vec<Candidate>> = group_by_source(pool, chunks).into_values().collect();
    let mut selected = Vec::with_capacity(top_k);
    let mut round = 0;
    while selected.len() < top_k {
        let mut took_any = false;
        for group in &groups {
            if selected.len() == top_k {
                break;
            }
            if let Some(candidate) = group.get(round) {
                selected.push(*candidate);
                took_any = true;
            }
        }
        if !took_any {
            break;
        }
        round += 1;
    }

    sort_by_score(&mut selected);
    selected
}

/// Threshold stage: drop candidates scoring below `min_score`.
pub fn apply_threshold(candidates: Vec<Candidate>, min_score: f32) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| c.score >= min_score)
        .collect()
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}
