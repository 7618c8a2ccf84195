//! Publish side of change propagation.
//!
//! [`CorpusMaintainer`] wraps an [`UpdateEngine`] and announces each
//! successful mutation on the bus. If the mutation succeeds but the
//! announcement does not, the caller gets [`Error::Notification`] and can
//! retry just the publish.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{EventBus, Topic};
use crate::error::{Error, Result};
use crate::retrieval::update_engine::{UpdateEngine, UpdateStats, UpdateStatus, UpdateSummary};

pub struct CorpusMaintainer {
    engine: Arc<UpdateEngine>,
    bus: Arc<dyn EventBus>,
}

impl CorpusMaintainer {
    pub fn new(engine: Arc<UpdateEngine>, bus: Arc<dyn EventBus>) -> Self {
        Self { engine, bus }
    }

    pub fn engine(&self) -> &Arc<UpdateEngine> {
        &self.engine
    }

    /// Run an update pass, then publish [`Topic::Updated`].
    pub async fn update(&self) -> Result<UpdateSummary> {
        let summary = self.engine.update().await?;
        self.notify(Topic::Updated).await?;
        Ok(summary)
    }

    /// Drop the corpus, then publish [`Topic::Dropped`].
    pub async fn drop_corpus(&self) -> Result<()> {
        self.engine.drop_corpus().await?;
        self.notify(Topic::Dropped).await
    }

    /// Publish `topic` on its own, e.g. to retry a failed notification.
    pub async fn notify(&self, topic: Topic) -> Result<()> {
        match self.bus.publish(topic).await {
            Ok(()) => {
                debug!(topic = %topic, "change published");
                Ok(())
            }
            Err(source) => {
                warn!(topic = %topic, error = %source, "change notification failed");
                Err(Error::Notification { topic, source })
            }
        }
    }

    /// Whether index hosts in other processes hear about changes made here
    pub fn reaches_other_processes(&self) -> bool {
        self.bus.spans_processes()
    }

    /// Warn that changes made here stay inside this process.
    ///
    /// Returns `true` when the warning was logged.
    pub fn warn_if_process_local(&self) -> bool {
        if self.reaches_other_processes() {
            return false;
        }
        warn!(
            "no cross-process event bus configured (events.redis_url); \
             index hosts in other processes will not see this change"
        );
        true
    }

    pub fn status(&self) -> UpdateStatus {
        self.engine.status()
    }

    pub async fn stats(&self) -> Result<UpdateStats> {
        self.engine.stats().await
    }
}

/// Run [`CorpusMaintainer::update`] every `period` until shutdown.
///
/// A pass still running when the next tick comes is not doubled up; the tick
/// is skipped.
pub fn spawn_periodic_update(
    maintainer: Arc<CorpusMaintainer>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs(), "periodic update started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let result = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = maintainer.update() => result,
                    };
                    match result {
                        Ok(summary) => info!(persisted = summary.persisted, "periodic update done"),
                        Err(Error::AlreadyRunning) => debug!("update already running, tick skipped"),
                        Err(e) => error!(error = %e, "periodic update failed"),
                    }
                }
            }
        }

        info!("periodic update stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::local_bus::LocalBus;
    use crate::events::{Delivery, Subscription};
    use crate::retrieval::normalizer::MockNormalizer;
    use crate::retrieval::update_engine::UpdateEngineConfig;
    use crate::source::ComicInfo;
    use crate::source::memory_feed::MemoryFeed;
    use crate::storage::CorpusStore;
    use crate::storage::memory_store::MemoryStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing_test::traced_test;

    /// Bus whose publishes fail while `down` is set.
    struct FlakyBus {
        inner: LocalBus,
        down: AtomicBool,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(&self, topic: Topic) -> anyhow::Result<()> {
            if self.down.load(Ordering::SeqCst) {
                bail!("no route to broker");
            }
            self.inner.publish(topic).await
        }

        async fn subscribe(&self, topic: Topic) -> anyhow::Result<Subscription> {
            self.inner.subscribe(topic).await
        }
    }

    fn setup(
        bus_down: bool,
    ) -> (
        Arc<MemoryStore>,
        Arc<MemoryFeed>,
        Arc<FlakyBus>,
        CorpusMaintainer,
    ) {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(MemoryFeed::with_comics((1..=3).map(|id| ComicInfo {
            id,
            title: "tree".to_string(),
            ..ComicInfo::default()
        })));
        let engine = Arc::new(UpdateEngine::new(
            store.clone(),
            feed.clone(),
            Arc::new(MockNormalizer::new()),
            UpdateEngineConfig::new(2),
        ));
        let bus = Arc::new(FlakyBus {
            inner: LocalBus::default(),
            down: AtomicBool::new(bus_down),
        });
        let maintainer = CorpusMaintainer::new(engine, bus.clone());
        (store, feed, bus, maintainer)
    }

    #[tokio::test]
    async fn test_update_publishes_after_persisting() {
        let (store, _, bus, maintainer) = setup(false);
        let mut updates = bus.subscribe(Topic::Updated).await.unwrap();

        assert_eq!(maintainer.update().await.unwrap().persisted, 3);
        assert_eq!(
            updates.next().await,
            Some(Delivery {
                topic: Topic::Updated
            })
        );
        assert_eq!(store.list_ids().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_drop_publishes_dropped() {
        let (store, _, bus, maintainer) = setup(false);
        maintainer.update().await.unwrap();
        let mut drops = bus.subscribe(Topic::Dropped).await.unwrap();

        maintainer.drop_corpus().await.unwrap();
        assert_eq!(drops.next().await.map(|d| d.topic), Some(Topic::Dropped));
        assert!(store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_publish_is_reported_separately() {
        let (store, _, bus, maintainer) = setup(true);

        let err = maintainer.update().await.unwrap_err();
        assert!(err.mutation_succeeded());
        assert!(matches!(
            err,
            Error::Notification {
                topic: Topic::Updated,
                ..
            }
        ));
        // The corpus change went through regardless
        assert_eq!(store.list_ids().await.unwrap().len(), 3);

        bus.down.store(false, Ordering::SeqCst);
        maintainer.notify(Topic::Updated).await.unwrap();

        bus.down.store(true, Ordering::SeqCst);
        let err = maintainer.drop_corpus().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Notification {
                topic: Topic::Dropped,
                ..
            }
        ));
        assert!(store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_update_publishes_nothing() {
        let (_, feed, bus, maintainer) = setup(false);
        let maintainer = Arc::new(maintainer);
        let mut updates = bus.subscribe(Topic::Updated).await.unwrap();

        feed.pause();
        let running = {
            let maintainer = maintainer.clone();
            tokio::spawn(async move { maintainer.update().await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.in_flight() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(
            maintainer.update().await,
            Err(Error::AlreadyRunning)
        ));
        feed.resume();
        running.await.unwrap().unwrap();

        assert!(updates.next().await.is_some());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), updates.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_process_local_bus_is_flagged() {
        let (_, _, bus, maintainer) = setup(false);
        // Another process has its own LocalBus, nothing published here reaches it
        let elsewhere = LocalBus::default();
        let mut remote = elsewhere.subscribe(Topic::Updated).await.unwrap();

        maintainer.update().await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), remote.next())
                .await
                .is_err()
        );

        assert!(!bus.spans_processes());
        assert!(!maintainer.reaches_other_processes());
        assert!(maintainer.warn_if_process_local());
        assert!(logs_contain("no cross-process event bus configured"));
    }

    #[tokio::test]
    async fn test_cross_process_bus_is_not_flagged() {
        struct SharedBus(LocalBus);

        #[async_trait]
        impl EventBus for SharedBus {
            async fn publish(&self, topic: Topic) -> anyhow::Result<()> {
                self.0.publish(topic).await
            }

            async fn subscribe(&self, topic: Topic) -> anyhow::Result<Subscription> {
                self.0.subscribe(topic).await
            }

            fn spans_processes(&self) -> bool {
                true
            }
        }

        let (_, _, _, local) = setup(false);
        let maintainer = CorpusMaintainer::new(
            local.engine().clone(),
            Arc::new(SharedBus(LocalBus::default())),
        );
        assert!(maintainer.reaches_other_processes());
        assert!(!maintainer.warn_if_process_local());
    }
}
