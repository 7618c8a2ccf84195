//! Cross-process event bus over Redis pub/sub.
//!
//! Each topic maps to the Redis channel named by [`Topic::subject`]. Publishing
//! goes through a shared [`ConnectionManager`], which reconnects on its own;
//! every subscription owns a dedicated pub/sub connection, released when the
//! subscription is dropped.

use super::{Delivery, EventBus, Subscription, Topic};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::fmt;
use tracing::{debug, info};

#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBus")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisBus {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis event bus at {}", redis_url);

        let client = redis::Client::open(redis_url).context("failed to create Redis client")?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .context("failed to connect to Redis")?;

        Ok(Self { client, conn })
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, topic: Topic) -> Result<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(topic.subject(), "")
            .await
            .with_context(|| format!("failed to publish {topic}"))?;
        debug!(topic = %topic, receivers, "published change event");
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("failed to open Redis pub/sub connection")?;
        pubsub
            .subscribe(topic.subject())
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;

        let deliveries = pubsub.into_on_message().map(move |_| Delivery { topic });
        Ok(Subscription::new(topic, deliveries.boxed()))
    }

    fn spans_processes(&self) -> bool {
        true
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis did not answer PING")?;
        Ok(())
    }
}
