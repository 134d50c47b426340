//! Transparent read-through cache over any [`Fetcher`].
//!
//! Keyed by full request URL. A successful GET populates the cache so that a
//! later identical GET - whether issued by the prefetch director or by the
//! render library's own store client - is served without touching the
//! network. Failed fetches are never cached.

use std::sync::Arc;

use bytes::Bytes;
use moka::future::Cache;

use super::fetcher::{BoxFuture, FetchError, Fetcher};

/// Default maximum cache weight in bytes (512 MiB).
pub const DEFAULT_MAX_CAPACITY_BYTES: u64 = 512 * 1024 * 1024;

/// Read-through cache wrapper for a [`Fetcher`].
///
/// The prefetch director and the foreground fetch path share one instance so
/// warmed URLs resolve instantly for the renderer. Entry count is exposed for
/// diagnostics only; the engine never inspects cache contents.
pub struct CachingFetcher {
    inner: Arc<dyn Fetcher>,
    cache: Cache<String, Bytes>,
}

impl CachingFetcher {
    /// Wrap a fetcher with the default capacity.
    pub fn new(inner: Arc<dyn Fetcher>) -> Self {
        Self::with_capacity(inner, DEFAULT_MAX_CAPACITY_BYTES)
    }

    /// Wrap a fetcher with an explicit byte capacity.
    pub fn with_capacity(inner: Arc<dyn Fetcher>, max_capacity_bytes: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity_bytes)
            .weigher(|key: &String, value: &Bytes| {
                (key.len() + value.len()).min(u32::MAX as usize) as u32
            })
            .build();
        Self { inner, cache }
    }

    /// Number of entries currently cached (diagnostics only).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether a URL is already cached, without fetching.
    pub fn contains(&self, url: &str) -> bool {
        self.cache.contains_key(url)
    }
}

impl Fetcher for CachingFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            if let Some(body) = self.cache.get(url).await {
                return Ok(body);
            }

            let body = self.inner.fetch(url).await?;
            self.cache.insert(url.to_string(), body.clone()).await;
            Ok(body)
        })
    }
}
