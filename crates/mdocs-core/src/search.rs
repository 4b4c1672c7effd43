//! In-memory inverted index over document titles, content and tags.
//!
//! The index is rebuilt wholesale by [`SearchIndex::update_index`]. Postings
//! are positions into the document snapshot taken at that moment; the index
//! owns that snapshot, so positions always resolve against the same set they
//! were built from. [`SearchIndex::generation`] increases with every rebuild.
//!
//! ## Scoring
//!
//! For every query term (tokenized like indexed text, stop words removed):
//!
//! | match                     | title | tags | content |
//! |---------------------------|-------|------|---------|
//! | exact                     | 3.0   | 2.0  | 1.0     |
//! | prefix                    | 2.4   | 1.6  | 0.8     |
//! | fuzzy (opt-in)            | 1.5   | 1.0  | 0.5     |
//!
//! Exact and prefix matches exclude each other; a prefix match is a longer
//! indexed term. Fuzzy matching is a separate pass over every indexed term
//! within Levenshtein distance
//! `floor(0.3 * max(len(query term), len(indexed term)))`, so an exact or
//! prefix hit that is also close enough scores the fuzzy bonus on top.

use crate::{Document, SearchHit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::debug;

const TITLE_WEIGHT: f64 = 3.0;
const TAG_WEIGHT: f64 = 2.0;
const CONTENT_WEIGHT: f64 = 1.0;
const PREFIX_FACTOR: f64 = 0.8;
const FUZZY_FACTOR: f64 = 0.5;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "were", "will", "with",
];

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`\n]*`").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_~]{1,3}").unwrap());

/// Query options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Score tag matches.
    pub search_in_tags: bool,
    /// Score near-miss spellings.
    pub fuzzy_search: bool,
    /// Additionally require every query word to appear with exact casing.
    pub case_sensitive: bool,
    /// Maximum results returned.
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_in_tags: true,
            fuzzy_search: false,
            case_sensitive: false,
            max_results: 10,
        }
    }
}

type Postings = HashMap<String, BTreeSet<usize>>;

/// Weighted inverted index with a per-query result cache.
#[derive(Debug, Default)]
pub struct SearchIndex {
    documents: Vec<Document>,
    haystacks: Vec<String>,
    title_index: Postings,
    content_index: Postings,
    tag_index: Postings,
    results: HashMap<String, Vec<(usize, f64)>>,
    generation: u64,
}

impl SearchIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every index from `documents`.
    ///
    /// Content for each document is taken from `content_cache` (keyed by
    /// document id) or, failing that, from the document's inline content.
    pub fn update_index(&mut self, documents: &[Document], content_cache: &HashMap<String, String>) {
        self.title_index.clear();
        self.content_index.clear();
        self.tag_index.clear();
        self.results.clear();
        self.documents = documents.to_vec();
        self.haystacks = Vec::with_capacity(documents.len());

        for (pos, doc) in documents.iter().enumerate() {
            add_terms(&mut self.title_index, &doc.title, pos);

            if let Some(description) = &doc.description {
                add_terms(&mut self.content_index, description, pos);
            }
            let content = content_cache.get(&doc.id).or(doc.content.as_ref());
            let cleaned = content.map(|c| clean_markdown(c)).unwrap_or_default();
            add_terms(&mut self.content_index, &cleaned, pos);

            for tag in &doc.tags {
                add_terms(&mut self.tag_index, tag, pos);
            }

            self.haystacks.push(
                [
                    doc.title.as_str(),
                    doc.description.as_deref().unwrap_or(""),
                    cleaned.as_str(),
                    &doc.tags.join(" "),
                ]
                .join("\n"),
            );
        }

        self.generation += 1;
        debug!(
            documents = documents.len(),
            title_terms = self.title_index.len(),
            content_terms = self.content_index.len(),
            tag_terms = self.tag_index.len(),
            "Rebuilt search index"
        );
    }

    /// Ranked documents matching `query`.
    pub fn search(&mut self, query: &str, options: &SearchOptions) -> Vec<Document> {
        self.search_hits(query, options)
            .into_iter()
            .map(|hit| hit.document)
            .collect()
    }

    /// Ranked matches with their scores.
    pub fn search_hits(&mut self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let key = format!("{query}\u{1f}{options:?}");
        let ranked = if let Some(cached) = self.results.get(&key) {
            debug!("Search cache hit for '{query}'");
            cached.clone()
        } else {
            let ranked = self.rank(query, options);
            self.results.insert(key, ranked.clone());
            ranked
        };

        ranked
            .into_iter()
            .filter_map(|(pos, score)| {
                self.documents.get(pos).map(|doc| SearchHit {
                    document: doc.clone(),
                    score,
                })
            })
            .collect()
    }

    fn rank(&self, query: &str, options: &SearchOptions) -> Vec<(usize, f64)> {
        let terms = index_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for term in &terms {
            score_field(&self.title_index, term, TITLE_WEIGHT, options.fuzzy_search, &mut scores);
            if options.search_in_tags {
                score_field(&self.tag_index, term, TAG_WEIGHT, options.fuzzy_search, &mut scores);
            }
            score_field(&self.content_index, term, CONTENT_WEIGHT, options.fuzzy_search, &mut scores);
        }

        if options.case_sensitive {
            let words = exact_case_words(query);
            scores.retain(|pos, _| {
                self.haystacks
                    .get(*pos)
                    .is_some_and(|hay| words.iter().all(|w| hay.contains(w.as_str())))
            });
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(options.max_results);
        ranked
    }

    /// Forget cached query results without rebuilding.
    pub fn clear_result_cache(&mut self) {
        self.results.clear();
    }

    /// Number of cached query results.
    #[must_use]
    pub fn cached_queries(&self) -> usize {
        self.results.len()
    }

    /// Rebuild counter; 0 until the first [`update_index`](Self::update_index).
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Documents in the current snapshot.
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

fn add_terms(index: &mut Postings, text: &str, pos: usize) {
    for term in index_terms(text) {
        index.entry(term).or_default().insert(pos);
    }
}

fn score_field(
    index: &Postings,
    term: &str,
    weight: f64,
    fuzzy: bool,
    scores: &mut HashMap<usize, f64>,
) {
    for (indexed, positions) in index {
        let direct = if indexed == term {
            Some(weight)
        } else if indexed.starts_with(term) {
            Some(weight * PREFIX_FACTOR)
        } else {
            None
        };
        let close = (fuzzy && within_fuzzy_distance(term, indexed)).then_some(weight * FUZZY_FACTOR);
        let contribution = match (direct, close) {
            (None, None) => continue,
            (direct, close) => direct.unwrap_or(0.0) + close.unwrap_or(0.0),
        };

        for pos in positions {
            *scores.entry(*pos).or_insert(0.0) += contribution;
        }
    }
}

fn within_fuzzy_distance(a: &str, b: &str) -> bool {
    let longest = a.chars().count().max(b.chars().count());
    let threshold = longest * 3 / 10;
    threshold > 0 && levenshtein(a, b) <= threshold
}

/// Edit distance counting insertions, deletions and substitutions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Strip markdown syntax that should not be searchable.
///
/// Code blocks and inline code are dropped, links keep only their text, and
/// heading and emphasis markers are removed.
pub fn clean_markdown(markdown: &str) -> String {
    let text = CODE_FENCE_RE.replace_all(markdown, " ");
    let text = INLINE_CODE_RE.replace_all(&text, " ");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = HEADING_RE.replace_all(&text, "");
    EMPHASIS_RE.replace_all(&text, "").into_owned()
}

/// Lowercase, drop punctuation, split on whitespace, drop one-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Whether `token` (lowercase) is excluded from indexing.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

fn index_terms(text: &str) -> Vec<String> {
    tokenize(text).into_iter().filter(|t| !is_stop_word(t)).collect()
}

fn exact_case_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>())
        .filter(|w| w.chars().count() > 1 && !is_stop_word(&w.to_lowercase()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    fn build(documents: &[Document]) -> SearchIndex {
        let mut index = SearchIndex::new();
        index.update_index(documents, &HashMap::new());
        index
    }

    #[test]
    fn test_title_outranks_content() {
        // Given: One title match and one content match for "quick"
        let docs = vec![
            Document::new("a", "Quick Start"),
            Document::new("b", "Start Here").with_content("quick reference"),
        ];
        let mut index = build(&docs);

        // When: Searching with default options
        let hits = index.search_hits("quick", &SearchOptions::default());

        // Then: Title weight 3 beats content weight 1
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, "a");
        assert_eq!(hits[0].score, 3.0);
        assert_eq!(hits[1].document.id, "b");
        assert_eq!(hits[1].score, 1.0);
    }

    #[test]
    fn test_search_before_update_is_empty() {
        let mut index = SearchIndex::new();
        assert_eq!(index.generation(), 0);
        assert!(index.search("anything", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn test_results_reflect_latest_document_set() {
        let mut index = build(&[Document::new("old", "Routing guide")]);
        assert_eq!(ids(&index.search("routing", &SearchOptions::default())), vec!["old"]);

        index.update_index(
            &[Document::new("x", "Intro"), Document::new("new", "Routing basics")],
            &HashMap::new(),
        );

        assert_eq!(index.generation(), 2);
        assert_eq!(index.cached_queries(), 0);
        assert_eq!(ids(&index.search("routing", &SearchOptions::default())), vec!["new"]);
    }

    #[test]
    fn test_content_cache_takes_precedence_over_inline_content() {
        let docs = vec![Document::new("a", "A").with_content("stale words")];
        let mut cache = HashMap::new();
        cache.insert("a".to_string(), "fresh material".to_string());

        let mut index = SearchIndex::new();
        index.update_index(&docs, &cache);

        let options = SearchOptions::default();
        assert_eq!(ids(&index.search("fresh", &options)), vec!["a"]);
        assert!(index.search("stale", &options).is_empty());
    }

    #[test]
    fn test_description_is_indexed_as_content() {
        let docs = vec![Document::new("a", "A").with_description("Deployment checklist")];
        let mut index = build(&docs);
        let hits = index.search_hits("deployment", &SearchOptions::default());
        assert_eq!(hits[0].score, CONTENT_WEIGHT);
    }

    #[test]
    fn test_tags_weight_and_toggle() {
        let docs = vec![Document::new("a", "Overview").with_tags(["rust"])];
        let mut index = build(&docs);

        let hits = index.search_hits("rust", &SearchOptions::default());
        assert_eq!(hits[0].score, TAG_WEIGHT);

        let no_tags = SearchOptions {
            search_in_tags: false,
            ..SearchOptions::default()
        };
        assert!(index.search("rust", &no_tags).is_empty());
    }

    #[test]
    fn test_prefix_match_scores_reduced_weight() {
        let docs = vec![Document::new("a", "Installation")];
        let mut index = build(&docs);
        let hits = index.search_hits("inst", &SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - TITLE_WEIGHT * PREFIX_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_matching_is_opt_in() {
        let docs = vec![Document::new("a", "Installation")];
        let mut index = build(&docs);

        assert!(index.search("instalation", &SearchOptions::default()).is_empty());

        let fuzzy = SearchOptions {
            fuzzy_search: true,
            ..SearchOptions::default()
        };
        let hits = index.search_hits("instalation", &fuzzy);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, TITLE_WEIGHT * FUZZY_FACTOR);
    }

    #[test]
    fn test_fuzzy_bonus_adds_to_exact_matches() {
        // Given: An exact title match and a longer title with a content match
        let docs = vec![
            Document::new("a", "Rust"),
            Document::new("b", "Rustacean").with_content("rust"),
        ];
        let mut index = build(&docs);
        let fuzzy = SearchOptions {
            fuzzy_search: true,
            ..SearchOptions::default()
        };

        // When: Searching with fuzzy matching on
        let hits = index.search_hits("rust", &fuzzy);

        // Then: a = 3 + 1.5, b = 2.4 prefix + 1 + 0.5 content
        assert_eq!(hits[0].document.id, "a");
        assert!((hits[0].score - 4.5).abs() < 1e-9);
        assert_eq!(hits[1].document.id, "b");
        assert!((hits[1].score - 3.9).abs() < 1e-9);
    }

    #[test]
    fn test_short_terms_are_never_fuzzy() {
        let docs = vec![Document::new("a", "Go")];
        let mut index = build(&docs);
        let fuzzy = SearchOptions {
            fuzzy_search: true,
            ..SearchOptions::default()
        };
        assert!(index.search("no", &fuzzy).is_empty());
    }

    #[test]
    fn test_scores_accumulate_across_terms_and_fields() {
        let docs = vec![
            Document::new("a", "Async runtime").with_content("tokio runtime"),
            Document::new("b", "Runtime").with_tags(["async"]),
        ];
        let mut index = build(&docs);
        let hits = index.search_hits("async runtime", &SearchOptions::default());

        // a: title async 3 + title runtime 3 + content runtime 1
        // b: tag async 2 + title runtime 3
        assert_eq!(hits[0].document.id, "a");
        assert_eq!(hits[0].score, 7.0);
        assert_eq!(hits[1].score, 5.0);
    }

    #[test]
    fn test_stop_words_only_query_is_empty() {
        let docs = vec![Document::new("a", "The Guide")];
        let mut index = build(&docs);
        assert!(index.search("the", &SearchOptions::default()).is_empty());
        assert!(index.search("", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn test_max_results_truncates() {
        let docs: Vec<Document> = (0..20)
            .map(|i| Document::new(format!("d{i}"), format!("Chapter {i}")))
            .collect();
        let mut index = build(&docs);

        let hits = index.search("chapter", &SearchOptions::default());
        assert_eq!(hits.len(), 10);
        assert_eq!(hits[0].id, "d0");

        let three = SearchOptions {
            max_results: 3,
            ..SearchOptions::default()
        };
        assert_eq!(index.search("chapter", &three).len(), 3);
    }

    #[test]
    fn test_results_are_cached_per_query_and_options() {
        let docs = vec![Document::new("a", "Caching")];
        let mut index = build(&docs);

        index.search("caching", &SearchOptions::default());
        index.search("caching", &SearchOptions::default());
        assert_eq!(index.cached_queries(), 1);

        index.search(
            "caching",
            &SearchOptions {
                fuzzy_search: true,
                ..SearchOptions::default()
            },
        );
        assert_eq!(index.cached_queries(), 2);

        index.clear_result_cache();
        assert_eq!(index.cached_queries(), 0);
    }

    #[test]
    fn test_case_sensitive_filters_on_original_casing() {
        let docs = vec![
            Document::new("upper", "Rust API"),
            Document::new("lower", "api notes"),
        ];
        let mut index = build(&docs);

        assert_eq!(index.search("API", &SearchOptions::default()).len(), 2);

        let exact = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        assert_eq!(ids(&index.search("API", &exact)), vec!["upper"]);
    }

    #[test]
    fn test_markdown_syntax_is_not_indexed() {
        let content = "# Setup\n\n```rust\nfn secretfn() {}\n```\nUse `hiddencode` and see [the guide](https://x.test/hiddenurl). **Bold** claim.";
        let docs = vec![Document::new("a", "A").with_content(content)];
        let mut index = build(&docs);
        let options = SearchOptions::default();

        assert!(index.search("secretfn", &options).is_empty());
        assert!(index.search("hiddencode", &options).is_empty());
        assert!(index.search("hiddenurl", &options).is_empty());
        assert_eq!(index.search("guide", &options).len(), 1);
        assert_eq!(index.search("bold", &options).len(), 1);
        assert_eq!(index.search("setup", &options).len(), 1);
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Hello, World! A b c's e-mail"),
            vec!["hello", "world", "cs", "email"]
        );
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("héllo", "hello"), 1);
    }

    proptest! {
        #[test]
        fn test_tokens_are_lowercase_and_long(text in r"\PC{0,200}") {
            for token in tokenize(&text) {
                prop_assert!(token.chars().count() > 1);
                prop_assert!(!token.chars().any(char::is_whitespace));
                prop_assert_eq!(token.to_lowercase(), token.clone());
            }
        }

        #[test]
        fn test_levenshtein_is_symmetric(a in "[a-z]{0,12}", b in "[a-z]{0,12}") {
            prop_assert_eq!(levenshtein(&a, &b), levenshtein(&b, &a));
        }
    }
}
