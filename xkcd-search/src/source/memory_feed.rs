use super::{ComicInfo, SourceFeed};
use crate::storage::ComicId;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// In-memory source feed for tests and offline runs.
///
/// Fetches can be paused to hold an update pass open, and individual ids can
/// be made to fail. The feed counts fetches and the peak number of fetches in
/// flight at once.
pub struct MemoryFeed {
    comics: Mutex<BTreeMap<ComicId, ComicInfo>>,
    latest: Mutex<Option<ComicId>>,
    failing: Mutex<HashSet<ComicId>>,
    paused: watch::Sender<bool>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self {
            comics: Mutex::default(),
            latest: Mutex::default(),
            failing: Mutex::default(),
            paused: watch::Sender::new(false),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comics(comics: impl IntoIterator<Item = ComicInfo>) -> Self {
        let feed = Self::new();
        for comic in comics {
            feed.insert(comic);
        }
        feed
    }

    /// Publish a comic upstream
    pub fn insert(&self, comic: ComicInfo) {
        lock(&self.comics).insert(comic.id, comic);
    }

    /// Override the advertised latest id, e.g. above a gap of missing comics
    pub fn set_latest(&self, id: ComicId) {
        *lock(&self.latest) = Some(id);
    }

    /// Make every fetch of `id` fail
    pub fn fail_on(&self, id: ComicId) {
        lock(&self.failing).insert(id);
    }

    /// Undo [`fail_on`](Self::fail_on)
    pub fn recover(&self, id: ComicId) {
        lock(&self.failing).remove(&id);
    }

    /// Hold every fetch until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of fetches currently waiting or running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SourceFeed for MemoryFeed {
    async fn latest_id(&self) -> Result<ComicId> {
        if let Some(latest) = *lock(&self.latest) {
            return Ok(latest);
        }
        Ok(lock(&self.comics).keys().next_back().copied().unwrap_or(0))
    }

    async fn fetch(&self, id: ComicId) -> Result<Option<ComicInfo>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let mut paused = self.paused.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = paused.wait_for(|paused| !*paused).await;
        tokio::task::yield_now().await;

        if lock(&self.failing).contains(&id) {
            bail!("failed to request comic {id}: connection reset");
        }
        Ok(lock(&self.comics).get(&id).cloned())
    }
}
