//! Upstream comic feed.
//!
//! The feed answers two questions: what is the newest comic number, and what
//! does comic `N` look like. [`XkcdClient`](xkcd_client::XkcdClient) answers
//! them over the public xkcd JSON API; tests substitute in-memory feeds.

use crate::storage::ComicId;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory_feed;
pub mod xkcd_client;

/// Raw metadata of one upstream comic, as published in `info.0.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicInfo {
    #[serde(rename = "num")]
    pub id: ComicId,
    #[serde(rename = "img", default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub safe_title: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub alt: String,
}

impl ComicInfo {
    /// Text the keywords are derived from.
    pub fn description(&self) -> String {
        [
            self.title.as_str(),
            self.safe_title.as_str(),
            self.transcript.as_str(),
            self.alt.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Source of upstream comics.
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Newest comic number known upstream
    async fn latest_id(&self) -> Result<ComicId>;

    /// Fetch one comic; `None` when upstream has no such comic
    async fn fetch(&self, id: ComicId) -> Result<Option<ComicInfo>>;

    /// Check that upstream is reachable
    async fn ping(&self) -> Result<()> {
        self.latest_id().await.map(|_| ())
    }
}
