//! Storage abstraction layer for xkcd-search
//!
//! This module provides the trait-based abstraction for the durable comic corpus.
//! It separates storage concerns from ingestion and search logic, so the update
//! engine and the search engine can run against SQLite in production and an
//! in-memory map in tests while sharing one API.
//!
//! ## Key Components
//!
//! - **CorpusStore**: Keyed comic storage (add/get/list/stats/drop)
//! - **SqliteStore**: SQLite-backed implementation (see [`sqlite_store`])
//! - **MemoryStore**: In-memory implementation (see [`memory_store`])
//! - **Data Types**: [`Comic`] and [`StoreStats`]
//!
//! ## Architecture
//!
//! ```text
//! UpdateEngine ─┐                 ┌─ SqliteStore
//!               ├─ CorpusStore ───┤
//! SearchEngine ─┘                 └─ MemoryStore
//! ```
//!
//! Implementations must tolerate concurrent writes for distinct ids: the update
//! engine persists comics from a pool of concurrent fetches.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub mod memory_store;
pub mod sqlite_store;

/// Externally assigned, stable, positive comic number.
pub type ComicId = i64;

/// A stored comic. See module docs for details.
///
/// Comics are immutable once stored except for a full overwrite when the same
/// id is ingested again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    pub id: ComicId,
    /// Image URL
    pub url: String,
    pub title: String,
    pub alt: String,
    /// Transcript text
    pub body: String,
    /// Ranking signal. Zero at rest; search results carry the query relevance.
    pub score: u32,
    /// Normalized terms derived at ingestion, in first-occurrence order
    pub keywords: Vec<String>,
}

/// Corpus-wide counters. See module docs for details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Sum of keyword counts over all comics
    pub words_total: u64,
    /// Number of distinct keywords over all comics
    pub words_unique: u64,
    /// Number of stored comics
    pub comics_fetched: u64,
}

/// Durable keyed comic storage. See module docs for usage examples.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Insert or fully overwrite the comic with this id
    async fn add(&self, comic: Comic) -> Result<()>;

    /// Get a comic by id, `None` if absent
    async fn get(&self, id: ComicId) -> Result<Option<Comic>>;

    /// All stored ids
    async fn list_ids(&self) -> Result<BTreeSet<ComicId>>;

    /// Largest stored id, `None` for an empty corpus
    async fn last_id(&self) -> Result<Option<ComicId>>;

    /// Keyword and comic counters
    async fn stats(&self) -> Result<StoreStats>;

    /// Erase the whole corpus
    async fn drop_all(&self) -> Result<()>;

    /// Check that the store answers queries
    async fn ping(&self) -> Result<()> {
        self.last_id().await.map(|_| ())
    }

    /// Every stored comic in ascending id order.
    ///
    /// The default walks [`list_ids`](Self::list_ids) and fetches each comic;
    /// ids deleted in between are skipped.
    async fn all(&self) -> Result<Vec<Comic>> {
        let mut comics = Vec::new();
        for id in self.list_ids().await? {
            if let Some(comic) = self.get(id).await? {
                comics.push(comic);
            }
        }
        Ok(comics)
    }
}
