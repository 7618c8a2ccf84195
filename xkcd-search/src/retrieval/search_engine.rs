//! Query paths over the corpus and the lifecycle of the inverted index.
//!
//! [`SearchEngine::search`] scans every stored comic and is always current.
//! [`SearchEngine::search_index`] answers from the last built
//! [`InvertedIndex`] and may lag behind the store until the next rebuild.
//! Both share the scoring and ordering in [`ranking`], so right after a
//! successful build they return the same comics in the same order.
//!
//! ## Index lifecycle
//!
//! ```text
//! Empty ──build──→ Building ──ok──→ Ready ──build──→ Building ──ok──→ Ready
//!                     │                                 │
//!                     └──err──→ Empty                   └──err──→ Ready (old snapshot)
//! ```
//!
//! A build reads the store into a fresh index off to the side and then swaps
//! one `Arc`. Readers clone the current `Arc` under a short read lock and never
//! wait on a build. Builds are serialized among themselves, so an older
//! snapshot can never replace a newer one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::index_updater::IndexBuilder;
use super::inverted_index::InvertedIndex;
use super::normalizer::Normalizer;
use super::ranking;
use crate::error::{Error, Result};
use crate::storage::{Comic, CorpusStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// No build has succeeded yet
    Empty,
    /// A build is running; queries read the previous snapshot
    Building,
    /// A built snapshot is serving
    Ready,
}

/// Snapshot of the index for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub state: IndexState,
    pub terms: usize,
    pub comics: usize,
    pub built_at: Option<DateTime<Utc>>,
}

struct Building<'a>(&'a AtomicUsize);

impl Drop for Building<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SearchEngine {
    store: Arc<dyn CorpusStore>,
    normalizer: Arc<dyn Normalizer>,
    index: RwLock<Arc<InvertedIndex>>,
    build_lock: Mutex<()>,
    builds_in_flight: AtomicUsize,
    ready: AtomicBool,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn CorpusStore>, normalizer: Arc<dyn Normalizer>) -> Self {
        Self {
            store,
            normalizer,
            index: RwLock::new(Arc::new(InvertedIndex::empty())),
            build_lock: Mutex::new(()),
            builds_in_flight: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// Full-scan search, authoritative regardless of index freshness.
    ///
    /// `limit <= 0` means no limit. Fails with [`Error::NotFound`] when no
    /// comic shares a term with the phrase.
    pub async fn search(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>> {
        let terms = self.normalizer.normalize(phrase).await?;
        let query = ranking::distinct_terms(&terms);

        let comics = self.store.all().await?;
        let scanned = comics.len();
        let scored = comics.into_iter().map(|comic| Comic {
            score: ranking::score_keywords(&query, &comic.keywords),
            ..comic
        });
        let results = ranking::rank(scored, limit);

        debug!(phrase, terms = ?terms, scanned, hits = results.len(), "full-scan search");
        if results.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(results)
    }

    /// Search the current index snapshot.
    ///
    /// Same contract as [`search`](Self::search), but stale between a corpus
    /// change and the next rebuild.
    pub async fn search_index(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>> {
        let terms = self.normalizer.normalize(phrase).await?;
        let snapshot = self.snapshot().await;
        let results = snapshot.search(&terms, limit);

        debug!(phrase, terms = ?terms, hits = results.len(), "index search");
        if results.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(results)
    }

    /// Rebuild the index from the store and swap it in.
    ///
    /// Comics deleted while the build reads the store are left out. On any
    /// store failure the previous index keeps serving.
    pub async fn build_index(&self) -> Result<Arc<InvertedIndex>> {
        self.builds_in_flight.fetch_add(1, Ordering::AcqRel);
        let _building = Building(&self.builds_in_flight);
        let _serial = self.build_lock.lock().await;
        let started = Instant::now();

        let last_id = self.store.last_id().await?;
        let comics = self
            .store
            .all()
            .await
            .inspect_err(|e| warn!(error = %e, "index build aborted, keeping previous index"))?;

        let index = Arc::new(InvertedIndex::build(comics));
        *self.index.write().await = index.clone();
        self.ready.store(true, Ordering::Release);

        info!(
            last_id = ?last_id,
            comics = index.comic_count(),
            terms = index.term_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        Ok(index)
    }

    /// The index snapshot queries currently read
    pub async fn snapshot(&self) -> Arc<InvertedIndex> {
        self.index.read().await.clone()
    }

    pub fn index_state(&self) -> IndexState {
        if self.builds_in_flight.load(Ordering::Acquire) > 0 {
            IndexState::Building
        } else if self.ready.load(Ordering::Acquire) {
            IndexState::Ready
        } else {
            IndexState::Empty
        }
    }

    pub async fn index_info(&self) -> IndexInfo {
        let state = self.index_state();
        let snapshot = self.snapshot().await;
        IndexInfo {
            state,
            terms: snapshot.term_count(),
            comics: snapshot.comic_count(),
            built_at: self
                .ready
                .load(Ordering::Acquire)
                .then(|| snapshot.built_at()),
        }
    }
}

#[async_trait]
impl IndexBuilder for SearchEngine {
    async fn build_index(&self) -> Result<()> {
        SearchEngine::build_index(self).await.map(|_| ())
    }
}
