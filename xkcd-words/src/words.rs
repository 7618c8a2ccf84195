//! Phrase normalization for keyword search over comic text.
//!
//! Every piece of text that enters the search system, whether it is a comic's
//! title and transcript at ingestion time or a user's query phrase, goes through
//! [`normalize`] so that both sides speak the same vocabulary.
//!
//! The pipeline is:
//!
//! 1.  **Tokenize**: split on anything that is not a letter or a digit.
//! 2.  **Lowercase** every token.
//! 3.  **Filter** English stop words (see [`STOP_WORDS`]).
//! 4.  **Stem** what remains with Porter step 1 (see [`crate::stemmer`]).
//! 5.  **Deduplicate**, keeping the position of the first occurrence.
//!
//! The output is deterministic: the same input always yields the same ordered
//! term list, and empty input yields an empty list.
//!
//! ```
//! use xkcd_words::normalize;
//!
//! let terms = normalize("The quick brown fox jumps over the lazy dog");
//! assert_eq!(terms, vec!["quick", "brown", "fox", "jump", "lazi", "dog"]);
//!
//! // Query phrases go through the exact same pipeline.
//! assert_eq!(normalize("Running RUNS"), vec!["run"]);
//! assert!(normalize("the a an").is_empty());
//! ```
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::stemmer::stem;

/// Common English words that carry no search signal.
///
/// The list is applied after lowercasing and before stemming, so entries are
/// written in their surface form.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "s", "same", "she", "should",
    "so", "some", "such", "t", "than", "that", "the", "their", "theirs", "them", "themselves",
    "then", "there", "these", "they", "this", "those", "through", "to", "too", "under", "until",
    "up", "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("token pattern is a valid regex"));

static STOP_WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

/// Check whether a lowercase word is on the stop list.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORD_SET.contains(word)
}

/// Split text into lowercase alphanumeric tokens, in order, duplicates kept.
///
/// # Examples
/// ```
/// use xkcd_words::tokenize;
///
/// assert_eq!(tokenize("hello-world! testing@123"), vec!["hello", "world", "testing", "123"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Normalize free text into an ordered set of search terms.
///
/// See the module documentation for the individual steps.
///
/// # Arguments
/// * `text` - Any text: a query phrase, a comic title, a transcript
///
/// # Returns
/// Stemmed, lowercase, stop-word-free terms without duplicates, in order of
/// first appearance.
pub fn normalize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for token in tokenize(text) {
        if is_stop_word(&token) {
            continue;
        }
        let term = stem(&token);
        if term.is_empty() || is_stop_word(&term) {
            continue;
        }
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    }

    terms
}
