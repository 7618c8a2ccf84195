//! Relevance scoring and result ordering shared by both query paths.
//!
//! A comic's score for a query is the number of distinct query terms found in
//! its keywords. Results are ordered by descending score, ties by ascending id,
//! and truncated to the limit when the limit is positive.

use crate::storage::{Comic, ComicId};
use std::collections::HashSet;

/// Distinct query terms in first-occurrence order.
pub fn distinct_terms(terms: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(String::as_str)
        .filter(|term| seen.insert(*term))
        .collect()
}

/// Number of distinct query terms present in `keywords`.
pub fn score_keywords(terms: &[&str], keywords: &[String]) -> u32 {
    let keywords: HashSet<&str> = keywords.iter().map(String::as_str).collect();
    terms.iter().filter(|term| keywords.contains(*term)).count() as u32
}

/// Order scored comics and apply the limit.
///
/// Comics scoring zero are dropped. A `limit` of zero or less means no limit.
pub fn rank(scored: impl IntoIterator<Item = Comic>, limit: i64) -> Vec<Comic> {
    let mut ranked: Vec<Comic> = scored.into_iter().filter(|c| c.score > 0).collect();
    ranked.sort_unstable_by_key(|c| (std::cmp::Reverse(c.score), c.id));
    if limit > 0 {
        ranked.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    ranked
}

/// Ids of a ranked result, in order.
pub fn ids(ranked: &[Comic]) -> Vec<ComicId> {
    ranked.iter().map(|c| c.id).collect()
}
