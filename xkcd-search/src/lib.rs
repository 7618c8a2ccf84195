//! xkcd-search: a searchable, self-refreshing copy of the xkcd comic corpus
//!
//! This crate keeps a local corpus of xkcd comics up to date and answers
//! keyword queries over it, either by scanning the corpus or from an in-memory
//! inverted index that is rebuilt whenever the corpus changes.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: update engine, search engine, inverted index and the
//!   background triggers that rebuild it
//! - **[`storage`]**: corpus store abstraction with SQLite and in-memory implementations
//! - **[`source`]**: the upstream feed (xkcd JSON API)
//! - **[`events`]**: change notifications between corpus owners and index hosts
//! - **[`config`]** and **[`error`]**: configuration file and error taxonomy
//! - **[`health`]**: dependency reachability report
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use xkcd_search::retrieval::normalizer::WordsNormalizer;
//! use xkcd_search::retrieval::search_engine::SearchEngine;
//! use xkcd_search::retrieval::update_engine::{UpdateEngine, UpdateEngineConfig};
//! use xkcd_search::source::xkcd_client::XkcdClient;
//! use xkcd_search::storage::sqlite_store::SqliteStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(SqliteStore::open("xkcd.db".as_ref()).await?);
//! let feed = Arc::new(XkcdClient::new("https://xkcd.com", Duration::from_secs(10))?);
//! let normalizer = Arc::new(WordsNormalizer);
//!
//! let updater = UpdateEngine::new(store.clone(), feed, normalizer.clone(), UpdateEngineConfig::new(10));
//! updater.update().await?;
//!
//! let search = SearchEngine::new(store, normalizer);
//! search.build_index().await?;
//! for comic in search.search_index("happy new year", 5).await? {
//!     println!("{} {} ({})", comic.id, comic.title, comic.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SourceFeed → UpdateEngine → CorpusStore
//!                   ↓              ↓
//!          CorpusMaintainer   SearchEngine → InvertedIndex → queries
//!                   ↓              ↑
//!               EventBus ──→ event listeners / periodic rebuild
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod retrieval;
pub mod source;
pub mod storage;

pub use error::{Error, Result};
