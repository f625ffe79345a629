//! Clip metadata for card covers via TikTok's public oEmbed endpoint
//!
//! Lookups never fail: anything other than a clean 200 with JSON degrades to
//! an empty [`ClipMeta`] and the card falls back to a generated cover.

use crate::config::OembedConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Title, author and thumbnail of a clip; `None` means unknown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipMeta {
    pub thumb: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
}

impl ClipMeta {
    pub fn is_empty(&self) -> bool {
        self.thumb.is_none() && self.title.is_none() && self.author.is_none()
    }
}

#[async_trait]
pub trait ClipMetaSource: Send + Sync {
    async fn lookup(&self, url: &str) -> ClipMeta;
    fn name(&self) -> &'static str;
}

/// Look up many clips with bounded concurrency, keeping input order
pub async fn lookup_all(
    source: &dyn ClipMetaSource,
    urls: &[String],
    concurrency: usize,
) -> Vec<ClipMeta> {
    let lookups: Vec<_> = urls.iter().map(|u| source.lookup(u)).collect();
    stream::iter(lookups)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Source used when thumbnails are disabled
pub struct OfflineMeta;

#[async_trait]
impl ClipMetaSource for OfflineMeta {
    async fn lookup(&self, _url: &str) -> ClipMeta {
        ClipMeta::default()
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

#[derive(Deserialize)]
struct OembedResponse {
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl From<OembedResponse> for ClipMeta {
    fn from(r: OembedResponse) -> Self {
        Self {
            thumb: non_empty(r.thumbnail_url),
            title: non_empty(r.title),
            author: non_empty(r.author_name),
        }
    }
}

/// HTTP oEmbed client with a url-keyed LRU and an outbound rate limit
pub struct OembedClient {
    client: reqwest::Client,
    endpoint: String,
    cache: Mutex<LruCache<String, ClipMeta>>,
    limiter: DefaultDirectRateLimiter,
}

impl OembedClient {
    pub fn new(cfg: &OembedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("Failed to build reqwest client with timeout")?;
        let rps = NonZeroU32::new(cfg.requests_per_sec).unwrap_or(NonZeroU32::MIN);
        let cap = NonZeroUsize::new(cfg.cache_max).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            cache: Mutex::new(LruCache::new(cap)),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    async fn fetch(&self, url: &str) -> Result<ClipMeta> {
        self.limiter.until_ready().await;
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .send()
            .await
            .context("Failed to send oEmbed request")?;
        if !resp.status().is_success() {
            anyhow::bail!("oEmbed returned {}", resp.status());
        }
        let body: OembedResponse = resp.json().await.context("Failed to parse oEmbed body")?;
        Ok(body.into())
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl ClipMetaSource for OembedClient {
    async fn lookup(&self, url: &str) -> ClipMeta {
        // Not single-flight: concurrent misses on one url may both fetch, and
        // the later put overwrites the earlier one with an equal value.
        if let Some(hit) = self.cache.lock().await.get(url) {
            return hit.clone();
        }
        let meta = match self.fetch(url).await {
            Ok(m) => m,
            Err(e) => {
                debug!("oEmbed lookup failed for {}: {:#}", url, e);
                ClipMeta::default()
            }
        };
        self.cache.lock().await.put(url.to_string(), meta.clone());
        meta
    }

    fn name(&self) -> &'static str {
        "oembed"
    }
}

/// Build the configured metadata source
pub fn create_meta_source(cfg: &OembedConfig) -> Result<Arc<dyn ClipMetaSource>> {
    if !cfg.enabled {
        tracing::info!("oEmbed thumbnails disabled");
        return Ok(Arc::new(OfflineMeta));
    }
    Ok(Arc::new(OembedClient::new(cfg)?))
}
