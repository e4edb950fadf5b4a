//! Query tokenization for the lexical stage.
//!
//! Contract: the query is lowercased, maximal runs of Latin or Cyrillic
//! letters become tokens, stop words and tokens shorter than
//! `min_token_len` characters are dropped, and duplicates are removed keeping
//! first occurrence. Tokens of at least `specific_token_len` characters are
//! marked specific.

use std::collections::HashSet;
use std::sync::LazyLock;

use ragdex_core::RetrievalConfig;
use regex::Regex;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zа-яё]+").expect("word pattern is valid"));

/// Function words that never count toward a lexical match.
///
/// Russian interrogatives, prepositions and particles, plus their common
/// English counterparts.
pub const STOP_WORDS: &[&str] = &[
    // ru
    "кто", "такой", "какой", "что", "как", "это", "какая", "какое", "какие", "на", "в", "и",
    "из", "для", "по", "о", "об", "от", "до", "при", "с", "со", "к", "у", "не", "нет", "да",
    "или", "а", "но", "же", "бы", "ли", "уже", "еще", "ещё", "только",
    // en
    "who", "what", "which", "how", "is", "are", "was", "the", "an", "of", "in", "on", "for",
    "to", "and", "or", "not", "with", "by", "from", "about",
];

/// Significant words of a query.
///
/// # Examples
///
/// ```
/// use ragdex_core::RetrievalConfig;
/// use ragdex_retrieval::query::QueryTokens;
///
/// let tokens = QueryTokens::parse("Кто такой Глазунов Анатолий?", &RetrievalConfig::default());
/// assert_eq!(tokens.tokens, vec!["глазунов", "анатолий"]);
/// assert_eq!(tokens.specific, vec!["глазунов", "анатолий"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTokens {
    /// Distinct significant tokens in query order.
    pub tokens: Vec<String>,
    /// The subset of `tokens` long enough to be discriminative.
    pub specific: Vec<String>,
}

impl QueryTokens {
    pub fn parse(query: &str, config: &RetrievalConfig) -> Self {
        let lowered = query.to_lowercase();
        let mut seen = HashSet::new();
        let mut tokens = Vec::new();

        for m in WORD.find_iter(&lowered) {
            let word = m.as_str();
            if word.chars().count() < config.min_token_len || STOP_WORDS.contains(&word) {
                continue;
            }
            if seen.insert(word) {
                tokens.push(word.to_string());
            }
        }

        let specific = tokens
            .iter()
            .filter(|t| t.chars().count() >= config.specific_token_len)
            .cloned()
            .collect();

        Self { tokens, specific }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether `text` (already lowercased) is a lexical match: at least
    /// `min_matches` distinct tokens occur in it, and if the query has any
    /// specific token, one of them is among those found.
    pub fn matches(&self, lowered_text: &str, min_matches: usize) -> bool {
        if self.tokens.len() < min_matches {
            return false;
        }
        let found = self
            .tokens
            .iter()
            .filter(|t| lowered_text.contains(t.as_str()))
            .count();
        if found < min_matches {
            return false;
        }
        self.specific.is_empty()
            || self
                .specific
                .iter()
                .any(|t| lowered_text.contains(t.as_str()))
    }
}
