//! Background triggers that keep the inverted index fresh.
//!
//! Two independent lifelines call [`IndexBuilder::build_index`]:
//!
//! - one listener task per [`Topic`], rebuilding on every delivery;
//! - a ticker, rebuilding once at start and then every period, which bounds
//!   staleness even when every event is lost.
//!
//! Both stop when the shared [`CancellationToken`] is cancelled. A build that
//! is interrupted by shutdown never reaches its swap, so the serving index is
//! left as it was. Build failures are logged and the loop carries on.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::{EventBus, Subscription, Topic};

const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Anything that can rebuild its index from the current corpus.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    async fn build_index(&self) -> Result<()>;
}

/// Run one build unless shutdown comes first. `false` on shutdown.
async fn rebuild(builder: &dyn IndexBuilder, shutdown: &CancellationToken, trigger: &str) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        result = builder.build_index() => {
            if let Err(e) = result {
                error!(trigger, error = %e, "index rebuild failed");
            }
            true
        }
    }
}

/// Subscribe to every topic and spawn one rebuild listener per subscription.
///
/// Subscriptions are live when this returns, so events published afterwards
/// are seen. Fails if any subscription cannot be opened.
pub async fn spawn_event_listeners(
    builder: Arc<dyn IndexBuilder>,
    bus: &dyn EventBus,
    shutdown: CancellationToken,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let mut subscriptions = Vec::with_capacity(Topic::ALL.len());
    for topic in Topic::ALL {
        subscriptions.push(bus.subscribe(topic).await?);
    }

    Ok(subscriptions
        .into_iter()
        .map(|subscription| {
            tokio::spawn(listen(builder.clone(), subscription, shutdown.clone()))
        })
        .collect())
}

async fn listen(
    builder: Arc<dyn IndexBuilder>,
    mut subscription: Subscription,
    shutdown: CancellationToken,
) {
    let topic = subscription.topic();
    info!(topic = %topic, "listening for corpus changes");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            delivery = subscription.next() => match delivery {
                Some(delivery) => {
                    debug!(topic = %delivery.topic, "change event received, rebuilding index");
                    if !rebuild(builder.as_ref(), &shutdown, topic.subject()).await {
                        break;
                    }
                }
                None => {
                    warn!(topic = %topic, "subscription closed");
                    break;
                }
            },
        }
    }

    info!(topic = %topic, "event listener stopped");
}

/// Rebuild right away and then every `period` until shutdown.
///
/// Ticks missed while a build runs are delayed, not bunched up.
pub fn spawn_periodic_rebuild(
    builder: Arc<dyn IndexBuilder>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(MIN_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs_f64(), "periodic index rebuild started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if !rebuild(builder.as_ref(), &shutdown, "timer").await {
                        break;
                    }
                }
            }
        }

        info!("periodic index rebuild stopped");
    })
}
