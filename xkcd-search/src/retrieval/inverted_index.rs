//! In-memory inverted index over the comic corpus.
//!
//! An [`InvertedIndex`] is built in one go from a full corpus snapshot and never
//! changes afterwards. Rebuilding means building a new one and swapping the
//! shared reference, so readers holding the old snapshot are unaffected.

use super::ranking;
use crate::storage::{Comic, ComicId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

/// Term → comic ids, plus the comics needed to render results.
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    postings: HashMap<String, BTreeSet<ComicId>>,
    comics: HashMap<ComicId, Comic>,
    built_at: DateTime<Utc>,
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl InvertedIndex {
    pub fn empty() -> Self {
        Self {
            postings: HashMap::new(),
            comics: HashMap::new(),
            built_at: Utc::now(),
        }
    }

    /// Derive postings for every comic. Later duplicates of an id replace earlier ones.
    pub fn build(comics: impl IntoIterator<Item = Comic>) -> Self {
        let mut by_id: HashMap<ComicId, Comic> = HashMap::new();
        for mut comic in comics {
            comic.score = 0;
            by_id.insert(comic.id, comic);
        }

        let mut postings: HashMap<String, BTreeSet<ComicId>> = HashMap::new();
        for comic in by_id.values() {
            for keyword in &comic.keywords {
                postings.entry(keyword.clone()).or_default().insert(comic.id);
            }
        }

        Self {
            postings,
            comics: by_id,
            built_at: Utc::now(),
        }
    }

    /// Ids of comics whose keywords contain `term`
    pub fn postings(&self, term: &str) -> Option<&BTreeSet<ComicId>> {
        self.postings.get(term)
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn comic_count(&self) -> usize {
        self.comics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comics.is_empty()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Score and rank comics for already-normalized query terms.
    ///
    /// Only the postings of the query terms are visited.
    pub fn search(&self, terms: &[String], limit: i64) -> Vec<Comic> {
        let mut scores: HashMap<ComicId, u32> = HashMap::new();
        for term in ranking::distinct_terms(terms) {
            if let Some(ids) = self.postings.get(term) {
                for id in ids {
                    *scores.entry(*id).or_insert(0) += 1;
                }
            }
        }

        let scored = scores.into_iter().filter_map(|(id, score)| {
            self.comics.get(&id).map(|comic| Comic {
                score,
                ..comic.clone()
            })
        });
        ranking::rank(scored, limit)
    }
}
