//! Dependency reachability report.
//!
//! Each dependency answers a cheap ping; the report maps its name to
//! [`Reply::Ok`] or [`Reply::Unavailable`]. Failures are logged with their
//! cause, the report itself only carries the verdict.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

use crate::events::EventBus;
use crate::source::SourceFeed;
use crate::storage::CorpusStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ok,
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReport {
    pub replies: BTreeMap<String, Reply>,
}

impl PingReport {
    /// Ping the corpus store and the upstream feed.
    pub async fn check(store: &dyn CorpusStore, feed: &dyn SourceFeed) -> Self {
        let (store_result, feed_result) = tokio::join!(store.ping(), feed.ping());
        let mut report = Self::default();
        report.record("store", store_result);
        report.record("feed", feed_result);
        report
    }

    pub async fn check_bus(&mut self, bus: &dyn EventBus) {
        self.record("bus", bus.ping().await);
    }

    pub fn record(&mut self, name: &str, result: anyhow::Result<()>) {
        let reply = match result {
            Ok(()) => Reply::Ok,
            Err(e) => {
                error!(dependency = name, error = %format!("{e:#}"), "dependency is not available");
                Reply::Unavailable
            }
        };
        self.replies.insert(name.to_string(), reply);
    }

    pub fn all_ok(&self) -> bool {
        self.replies.values().all(|reply| *reply == Reply::Ok)
    }
}
