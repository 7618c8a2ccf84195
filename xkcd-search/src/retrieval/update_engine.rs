//! Incremental ingestion of upstream comics into the corpus store.
//!
//! ## Key Components
//!
//! - **UpdateEngine**: runs update passes, reports status and statistics
//! - **UpdateEngineConfig**: width of the fetch pool
//! - **UpdateStats** / **UpdateStatus** / **UpdateSummary**: reporting types
//!
//! ## Update Pass
//!
//! ```text
//! list_ids ─┐
//!           ├─ missing = {1..latest} − stored ─→ fetch ×N ─→ normalize ─→ add
//! latest_id ┘                                   (bounded)
//! ```
//!
//! Only one pass runs at a time per engine. A second caller does not wait: it
//! gets [`Error::AlreadyRunning`] straight away. The in-progress flag is taken
//! before id discovery and released on every exit path, including errors and
//! the pass future being dropped on shutdown.
//!
//! The first failing fetch or write aborts the pass. Comics persisted before
//! that stay persisted, and the next pass only fetches what is still missing.
//! The engine never publishes change events; see
//! [`CorpusMaintainer`](crate::events::maintainer::CorpusMaintainer) for that.

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::normalizer::Normalizer;
use crate::error::{Error, Result};
use crate::source::SourceFeed;
use crate::storage::{Comic, ComicId, CorpusStore, StoreStats};

/// Configuration for the update engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateEngineConfig {
    /// Maximum number of concurrent upstream fetches
    pub concurrency: usize,
}

impl Default for UpdateEngineConfig {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

impl UpdateEngineConfig {
    /// # Arguments
    /// * `concurrency` - Fetch pool width, raised to 1 if zero
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }
}

/// Whether an update pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Idle,
    Running,
}

/// Corpus statistics plus the upstream total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStats {
    #[serde(flatten)]
    pub store: StoreStats,
    /// Latest comic number known upstream
    pub comics_total: ComicId,
}

/// Outcome of one successful update pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub latest_id: ComicId,
    /// Comics fetched and stored by this pass
    pub persisted: usize,
    /// Missing ids that upstream does not have
    pub skipped: usize,
}

/// Releases the in-progress flag when dropped.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UpdateEngine {
    store: Arc<dyn CorpusStore>,
    feed: Arc<dyn SourceFeed>,
    normalizer: Arc<dyn Normalizer>,
    config: UpdateEngineConfig,
    in_progress: AtomicBool,
}

impl UpdateEngine {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        feed: Arc<dyn SourceFeed>,
        normalizer: Arc<dyn Normalizer>,
        config: UpdateEngineConfig,
    ) -> Self {
        Self {
            store,
            feed,
            normalizer,
            config: UpdateEngineConfig::new(config.concurrency),
            in_progress: AtomicBool::new(false),
        }
    }

    fn begin(&self) -> Result<InProgress<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InProgress(&self.in_progress))
            .map_err(|_| Error::AlreadyRunning)
    }

    /// Run one incremental update pass.
    ///
    /// Returns once every newly fetched comic is stored.
    pub async fn update(&self) -> Result<UpdateSummary> {
        let _in_progress = self.begin()?;
        let started = Instant::now();

        let stored = self.store.list_ids().await?;
        let latest_id = self.feed.latest_id().await?;
        let missing: Vec<ComicId> = (1..=latest_id).filter(|id| !stored.contains(id)).collect();

        info!(
            latest_id,
            stored = stored.len(),
            missing = missing.len(),
            concurrency = self.config.concurrency,
            "starting update"
        );

        let persisted = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);

        futures::stream::iter(missing)
            .map(Ok::<_, Error>)
            .try_for_each_concurrent(self.config.concurrency, |id| {
                let persisted = &persisted;
                let skipped = &skipped;
                async move {
                    if self.ingest(id).await? {
                        persisted.fetch_add(1, Ordering::Relaxed);
                    } else {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(())
                }
            })
            .await
            .inspect_err(|e| {
                warn!(
                    error = %e,
                    persisted = persisted.load(Ordering::Relaxed),
                    "update aborted"
                )
            })?;

        let summary = UpdateSummary {
            latest_id,
            persisted: persisted.into_inner(),
            skipped: skipped.into_inner(),
        };
        info!(
            persisted = summary.persisted,
            skipped = summary.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "update finished"
        );
        Ok(summary)
    }

    /// Fetch, normalize and store one comic. `false` when upstream has no such id.
    async fn ingest(&self, id: ComicId) -> Result<bool> {
        let Some(info) = self.feed.fetch(id).await? else {
            warn!(id, "comic missing upstream, skipping");
            return Ok(false);
        };

        let keywords = self.normalizer.normalize(&info.description()).await?;
        debug!(id, keywords = keywords.len(), "storing comic");

        self.store
            .add(Comic {
                id,
                url: info.url,
                title: info.title,
                alt: info.alt,
                body: info.transcript,
                score: 0,
                keywords,
            })
            .await?;
        Ok(true)
    }

    /// Never fails, never blocks.
    pub fn status(&self) -> UpdateStatus {
        if self.in_progress.load(Ordering::Acquire) {
            UpdateStatus::Running
        } else {
            UpdateStatus::Idle
        }
    }

    pub async fn stats(&self) -> Result<UpdateStats> {
        let store = self.store.stats().await?;
        let comics_total = self.feed.latest_id().await?;
        Ok(UpdateStats {
            store,
            comics_total,
        })
    }

    /// Erase the corpus. Not serialized against [`update`](Self::update).
    pub async fn drop_corpus(&self) -> Result<()> {
        self.store.drop_all().await?;
        info!("corpus dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::normalizer::MockNormalizer;
    use crate::source::ComicInfo;
    use crate::source::memory_feed::MemoryFeed;
    use crate::storage::memory_store::MemoryStore;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn info(id: ComicId, title: &str) -> ComicInfo {
        ComicInfo {
            id,
            url: format!("url{id}"),
            title: title.to_string(),
            transcript: format!("transcript {id}"),
            ..ComicInfo::default()
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        feed: Arc<MemoryFeed>,
        engine: Arc<UpdateEngine>,
    }

    fn fixture(concurrency: usize, comics: impl IntoIterator<Item = ComicInfo>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(MemoryFeed::with_comics(comics));
        let engine = Arc::new(UpdateEngine::new(
            store.clone(),
            feed.clone(),
            Arc::new(MockNormalizer::new()),
            UpdateEngineConfig::new(concurrency),
        ));
        Fixture {
            store,
            feed,
            engine,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_update_fetches_only_missing_ids() {
        let f = fixture(2, [info(1, "one"), info(2, "new year"), info(3, "happy year")]);
        f.store
            .add(Comic {
                id: 1,
                url: "url1".into(),
                title: "one".into(),
                alt: String::new(),
                body: String::new(),
                score: 0,
                keywords: vec!["one".into()],
            })
            .await
            .unwrap();

        let summary = f.engine.update().await.unwrap();
        assert_eq!(
            summary,
            UpdateSummary {
                latest_id: 3,
                persisted: 2,
                skipped: 0,
            }
        );
        assert_eq!(f.feed.fetch_count(), 2);

        let stored = f.store.get(2).await.unwrap().unwrap();
        assert_eq!(stored.url, "url2");
        assert_eq!(stored.body, "transcript 2");
        assert_eq!(stored.keywords, vec!["new", "year", "transcript", "2"]);
    }

    #[tokio::test]
    async fn test_second_update_is_a_no_op() {
        let f = fixture(4, (1..=5).map(|id| info(id, "tree")));

        assert_eq!(f.engine.update().await.unwrap().persisted, 5);
        let fetches = f.feed.fetch_count();

        let again = f.engine.update().await.unwrap();
        assert_eq!(again.persisted, 0);
        assert_eq!(f.feed.fetch_count(), fetches);
        assert_eq!(
            f.store.list_ids().await.unwrap(),
            (1..=5).collect::<BTreeSet<_>>()
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_upstream_ids_are_skipped() {
        let f = fixture(2, [info(403, "a"), info(405, "b")]);

        let summary = f.engine.update().await.unwrap();
        assert_eq!(summary.persisted, 2);
        assert_eq!(summary.skipped, 403);
        assert_eq!(f.store.list_ids().await.unwrap(), BTreeSet::from([403, 405]));
        assert!(logs_contain("comic missing upstream"));
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_but_keeps_persisted() {
        let f = fixture(1, (1..=6).map(|id| info(id, "x")));
        f.feed.fail_on(4);

        let err = f.engine.update().await.unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
        assert!(err.to_string().contains("failed to request comic 4"));

        // Width 1 fetches in id order, so 1..=3 made it in before the failure
        assert_eq!(f.store.list_ids().await.unwrap(), BTreeSet::from([1, 2, 3]));
        assert_eq!(f.engine.status(), UpdateStatus::Idle);

        // A retry picks up where the failed pass stopped
        f.feed.recover(4);
        assert_eq!(f.engine.update().await.unwrap().persisted, 3);
        assert_eq!(
            f.store.list_ids().await.unwrap(),
            (1..=6).collect::<BTreeSet<_>>()
        );
    }

    #[tokio::test]
    async fn test_normalizer_failure_surfaces_as_upstream() {
        let store = Arc::new(MemoryStore::new());
        let engine = UpdateEngine::new(
            store.clone(),
            Arc::new(MemoryFeed::with_comics([info(1, "x")])),
            Arc::new(MockNormalizer::failing()),
            UpdateEngineConfig::default(),
        );
        assert!(matches!(engine.update().await, Err(Error::Upstream { .. })));
        assert!(store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_update_fails_fast() {
        let f = fixture(2, (1..=4).map(|id| info(id, "x")));
        f.feed.pause();

        let engine = f.engine.clone();
        let first = tokio::spawn(async move { engine.update().await });
        let feed = f.feed.clone();
        wait_until(|| feed.in_flight() > 0).await;

        assert_eq!(f.engine.status(), UpdateStatus::Running);
        assert!(matches!(f.engine.update().await, Err(Error::AlreadyRunning)));

        f.feed.resume();
        assert_eq!(first.await.unwrap().unwrap().persisted, 4);
        assert_eq!(f.engine.status(), UpdateStatus::Idle);
    }

    #[tokio::test]
    async fn test_fetch_pool_is_bounded() {
        let f = fixture(3, (1..=30).map(|id| info(id, "x")));
        f.engine.update().await.unwrap();
        assert!(f.feed.max_in_flight() <= 3);
        assert_eq!(f.store.list_ids().await.unwrap().len(), 30);
    }

    #[tokio::test]
    async fn test_cancelled_update_releases_flag() {
        let f = fixture(2, (1..=4).map(|id| info(id, "x")));
        f.feed.pause();

        let engine = f.engine.clone();
        let pass = tokio::spawn(async move { engine.update().await });
        let feed = f.feed.clone();
        wait_until(|| feed.in_flight() > 0).await;
        assert_eq!(f.engine.status(), UpdateStatus::Running);

        pass.abort();
        assert!(pass.await.unwrap_err().is_cancelled());
        assert_eq!(f.engine.status(), UpdateStatus::Idle);

        f.feed.resume();
        assert_eq!(f.engine.update().await.unwrap().persisted, 4);
    }

    #[tokio::test]
    async fn test_stats_and_drop() {
        let f = fixture(2, [info(1, "new year"), info(2, "happy year")]);
        f.feed.set_latest(42);
        f.engine.update().await.unwrap();

        let stats = f.engine.stats().await.unwrap();
        assert_eq!(stats.comics_total, 42);
        assert_eq!(stats.store.comics_fetched, 2);
        assert_eq!(stats.store.words_total, 8);

        f.engine.drop_corpus().await.unwrap();
        f.engine.drop_corpus().await.unwrap();
        assert_eq!(f.engine.stats().await.unwrap().store, StoreStats::default());
    }
}
