//! Change notifications between the corpus owner and index hosts.
//!
//! Whoever mutates the corpus publishes a [`Topic`]; search hosts subscribe to
//! every topic and rebuild their index on any delivery. Deliveries carry no
//! payload, may be lost, duplicated or reordered, and handlers must not care:
//! "rebuild from the current store" is idempotent and order-independent.
//!
//! ## Buses
//!
//! - [`LocalBus`](local_bus::LocalBus): in-process, on `tokio::sync::broadcast`
//! - `RedisBus`: cross-process, Redis pub/sub (cargo feature `redis`)

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

pub mod local_bus;
pub mod maintainer;
#[cfg(feature = "redis")]
pub mod redis_bus;

/// Kind of corpus change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Updated,
    Dropped,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::Updated, Topic::Dropped];

    /// Channel name on the wire
    pub fn subject(self) -> &'static str {
        match self {
            Topic::Updated => "xkcd.db.updated",
            Topic::Dropped => "xkcd.db.dropped",
        }
    }

    pub fn from_subject(subject: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.subject() == subject)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject())
    }
}

/// One received notification. Topic identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Topic,
}

/// A live subscription to one topic.
///
/// Yields a [`Delivery`] per received notification and ends when the bus goes
/// away. Dropping it unsubscribes.
pub struct Subscription {
    topic: Topic,
    deliveries: BoxStream<'static, Delivery>,
}

impl Subscription {
    pub fn new(topic: Topic, deliveries: BoxStream<'static, Delivery>) -> Self {
        Self { topic, deliveries }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish()
    }
}

impl Stream for Subscription {
    type Item = Delivery;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().deliveries.as_mut().poll_next(cx)
    }
}

/// Fire-and-forget named-topic pub/sub.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Announce a change. Succeeds even when nobody listens.
    async fn publish(&self, topic: Topic) -> Result<()>;

    /// Start receiving notifications for `topic`.
    async fn subscribe(&self, topic: Topic) -> Result<Subscription>;

    /// Whether subscribers in other processes receive what this bus publishes
    fn spans_processes(&self) -> bool {
        false
    }

    /// Check that the bus can carry notifications
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
