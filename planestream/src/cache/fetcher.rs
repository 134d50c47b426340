//! The `Fetcher` trait and its HTTP implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during a fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connection, TLS, body read).
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Idempotent GET access to the chunk store.
///
/// Implementations must be safe to call concurrently; the engine imposes no
/// per-request timeout - timeout policy belongs to the transport layer.
///
/// # Implementors
///
/// - [`HttpFetcher`] - reqwest-backed network access
/// - [`CachingFetcher`](super::CachingFetcher) - transparent cache wrapper
/// - [`NullFetcher`] - testing: always succeeds with an empty body
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch the resource at `url`, returning its body.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>>;
}

/// HTTP fetcher backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with default client settings.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a fetcher whose underlying client enforces a request timeout.
    ///
    /// The engine itself imposes no timeouts; this is the transport-layer
    /// policy knob.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            let response =
                self.client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::Transport {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            response.bytes().await.map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })
    }
}

/// Testing fetcher that always succeeds with an empty body.
///
/// Useful for unit tests that exercise scheduling/bookkeeping without any
/// network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFetcher;

impl Fetcher for NullFetcher {
    fn fetch<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async { Ok(Bytes::new()) })
    }
}
