use super::{ComicInfo, SourceFeed};
use crate::storage::ComicId;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://xkcd.com";

/// HTTP client for the xkcd JSON API.
///
/// `GET {base}/info.0.json` describes the newest comic, `GET {base}/{id}/info.0.json`
/// a specific one.
#[derive(Clone, Debug)]
pub struct XkcdClient {
    http: Client,
    base_url: String,
}

impl XkcdClient {
    /// Build a client with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("xkcd-search/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_info(&self, path: &str, what: &str) -> Result<Option<ComicInfo>> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "requesting comic metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to request {what}"))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                bail!("failed to request {what}: upstream answered {status}")
            }
            _ => {}
        }

        let info = response
            .json::<ComicInfo>()
            .await
            .with_context(|| format!("failed to decode {what}"))?;
        Ok(Some(info))
    }
}

#[async_trait]
impl SourceFeed for XkcdClient {
    async fn latest_id(&self) -> Result<ComicId> {
        match self.get_info("/info.0.json", "latest comic").await? {
            Some(info) => Ok(info.id),
            None => bail!("failed to request latest comic: upstream answered 404"),
        }
    }

    async fn fetch(&self, id: ComicId) -> Result<Option<ComicInfo>> {
        self.get_info(&format!("/{id}/info.0.json"), &format!("comic {id}"))
            .await
    }
}
