use super::{Delivery, EventBus, Subscription, Topic};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

const DEFAULT_CAPACITY: usize = 16;

/// In-process event bus: one broadcast channel per topic.
///
/// Cloning shares the channels, so a publisher and any number of listeners
/// inside one process can hold their own handle.
#[derive(Clone)]
pub struct LocalBus {
    updated: broadcast::Sender<Delivery>,
    dropped: broadcast::Sender<Delivery>,
}

impl fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBus")
            .field("updated_subscribers", &self.updated.receiver_count())
            .field("dropped_subscribers", &self.dropped.receiver_count())
            .finish()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (updated, _) = broadcast::channel(capacity.max(1));
        let (dropped, _) = broadcast::channel(capacity.max(1));
        Self { updated, dropped }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Delivery> {
        match topic {
            Topic::Updated => &self.updated,
            Topic::Dropped => &self.dropped,
        }
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, topic: Topic) -> Result<()> {
        // No receivers is not a failure
        let _ = self.sender(topic).send(Delivery { topic });
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription> {
        let stream = BroadcastStream::new(self.sender(topic).subscribe()).map(move |item| {
            match item {
                Ok(delivery) => delivery,
                // Every missed delivery asks for the same rebuild, one stands in for all
                Err(err) => {
                    warn!(topic = %topic, error = %err, "subscriber lagged behind");
                    Delivery { topic }
                }
            }
        });
        Ok(Subscription::new(topic, stream.boxed()))
    }
}
