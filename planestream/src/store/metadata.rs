//! Per-level metadata documents and the store client that loads them.
//!
//! One metadata document is fetched per resolution level at session start.
//! Results are slotted by level index into a pre-sized vector so that
//! out-of-order async completion cannot corrupt level ordering.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::Fetcher;
use crate::error::{EngineError, EngineResult};

use super::level::{LevelSet, ResolutionLevel};

/// Separator assumed when the metadata document does not name one.
pub const DEFAULT_DIMENSION_SEPARATOR: &str = "/";

/// Attempts per metadata document (initial try plus retries).
const METADATA_ATTEMPTS: u32 = 3;

/// Delay between metadata retry attempts.
const METADATA_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Raw per-level metadata document.
///
/// The store serves one JSON document per level describing its array shape,
/// chunk shape, and the separator used in chunk keys.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelMetadata {
    /// Array extent per axis `(t, c, z, y, x)`.
    pub shape: Vec<u64>,
    /// Chunk extent per axis.
    pub chunks: Vec<u64>,
    /// Separator character for chunk keys; defaults to `/` when absent.
    #[serde(default)]
    pub dimension_separator: Option<String>,
}

impl LevelMetadata {
    /// Validate and convert into a [`ResolutionLevel`].
    pub fn into_level(self, index: usize, url: &str) -> EngineResult<ResolutionLevel> {
        let parse_err = |reason: String| EngineError::MetadataParse {
            url: url.to_string(),
            reason,
        };

        let array_shape: [u64; 5] = self
            .shape
            .try_into()
            .map_err(|v: Vec<u64>| parse_err(format!("expected 5 axes, got {}", v.len())))?;
        let chunk_shape: [u64; 5] = self
            .chunks
            .try_into()
            .map_err(|v: Vec<u64>| parse_err(format!("expected 5 chunk axes, got {}", v.len())))?;

        if chunk_shape.contains(&0) {
            return Err(parse_err("zero-sized chunk axis".to_string()));
        }

        Ok(ResolutionLevel {
            index,
            array_shape,
            chunk_shape,
            separator: self
                .dimension_separator
                .unwrap_or_else(|| DEFAULT_DIMENSION_SEPARATOR.to_string()),
        })
    }
}

/// Client for loading level metadata from a chunk store.
pub struct StoreClient {
    base_url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl StoreClient {
    /// Create a client for the store at `base_url`.
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            fetcher,
        }
    }

    /// Store base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Metadata document URL for one level.
    pub fn metadata_url(&self, level: usize) -> String {
        format!("{}/{}/.zarray", self.base_url(), level)
    }

    /// Load all `count` levels concurrently.
    ///
    /// Each document is fetched with a small fixed retry; results land in a
    /// pre-sized slot vector keyed by level index, so completion order does
    /// not matter. Fails if any level is missing after the pass.
    pub async fn load_levels(&self, count: usize) -> EngineResult<LevelSet> {
        if count == 0 {
            return Err(EngineError::EmptyPyramid);
        }

        let mut slots: Vec<Option<ResolutionLevel>> = Vec::with_capacity(count);
        slots.resize_with(count, || None);

        let fetches = (0..count).map(|index| {
            let url = self.metadata_url(index);
            async move { (index, self.fetch_one(&url).await) }
        });

        for (index, result) in join_all(fetches).await {
            match result {
                Ok(level) => {
                    debug!(
                        level = index,
                        width = level.width(),
                        height = level.height(),
                        planes = level.plane_count(),
                        "Level metadata loaded"
                    );
                    slots[index] = Some(level);
                }
                Err(e) => warn!(level = index, error = %e, "Level metadata load failed"),
            }
        }

        let mut levels = Vec::with_capacity(count);
        for (index, slot) in slots.into_iter().enumerate() {
            levels.push(slot.ok_or(EngineError::LevelMissing { index })?);
        }
        Ok(LevelSet::new(levels))
    }

    async fn fetch_one(&self, url: &str) -> EngineResult<ResolutionLevel> {
        let index = level_index_from_url(url);
        let mut last_reason = String::new();

        for attempt in 1..=METADATA_ATTEMPTS {
            match self.fetcher.fetch(url).await {
                Ok(body) => {
                    let doc: LevelMetadata = serde_json::from_slice(&body).map_err(|e| {
                        EngineError::MetadataParse {
                            url: url.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    return doc.into_level(index, url);
                }
                Err(e) => {
                    last_reason = e.to_string();
                    if attempt < METADATA_ATTEMPTS {
                        debug!(url, attempt, error = %last_reason, "Metadata fetch retry");
                        tokio::time::sleep(METADATA_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(EngineError::MetadataFetch {
            url: url.to_string(),
            reason: last_reason,
        })
    }
}

/// Recover the level index from a metadata URL (`.../{level}/.zarray`).
fn level_index_from_url(url: &str) -> usize {
    url.trim_end_matches("/.zarray")
        .rsplit('/')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BoxFuture, FetchError};
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fetcher serving canned metadata documents by URL.
    struct MapFetcher {
        docs: HashMap<String, String>,
        calls: AtomicU32,
    }

    impl MapFetcher {
        fn new(docs: HashMap<String, String>) -> Self {
            Self {
                docs,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Fetcher for MapFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let result = match self.docs.get(url) {
                Some(body) => Ok(Bytes::copy_from_slice(body.as_bytes())),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            };
            Box::pin(async move { result })
        }
    }

    fn doc(w: u64, h: u64, sep: Option<&str>) -> String {
        match sep {
            Some(s) => format!(
                r#"{{"shape":[1,2,50,{h},{w}],"chunks":[1,1,1,256,256],"dimension_separator":"{s}"}}"#
            ),
            None => format!(r#"{{"shape":[1,2,50,{h},{w}],"chunks":[1,1,1,256,256]}}"#),
        }
    }

    fn client_with(docs: Vec<(usize, String)>) -> StoreClient {
        let base = "http://store.test/image.zarr";
        let map = docs
            .into_iter()
            .map(|(i, body)| (format!("{base}/{i}/.zarray"), body))
            .collect();
        StoreClient::new(base, Arc::new(MapFetcher::new(map)))
    }

    #[tokio::test]
    async fn test_load_levels_preserves_order() {
        let client = client_with(vec![
            (0, doc(4096, 4096, Some("/"))),
            (1, doc(2048, 2048, Some("/"))),
            (2, doc(1024, 1024, Some("/"))),
        ]);

        let set = client.load_levels(3).await.unwrap();
        assert_eq!(set.len(), 3);
        for (i, level) in set.iter().enumerate() {
            assert_eq!(level.index, i);
        }
        assert_eq!(set.get(1).unwrap().width(), 2048);
        assert_eq!(set.scale_factor(2), 4.0);
    }

    #[tokio::test]
    async fn test_separator_defaults_to_slash() {
        let client = client_with(vec![(0, doc(512, 512, None))]);
        let set = client.load_levels(1).await.unwrap();
        assert_eq!(set.get(0).unwrap().separator, "/");
    }

    #[tokio::test]
    async fn test_separator_from_document() {
        let client = client_with(vec![(0, doc(512, 512, Some(".")))]);
        let set = client.load_levels(1).await.unwrap();
        assert_eq!(set.get(0).unwrap().separator, ".");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_level_reported() {
        let client = client_with(vec![(0, doc(512, 512, Some("/")))]);
        let err = client.load_levels(2).await.unwrap_err();
        assert!(matches!(err, EngineError::LevelMissing { index: 1 }));
    }

    #[tokio::test]
    async fn test_bad_axis_count_rejected() {
        let client = client_with(vec![(
            0,
            r#"{"shape":[50,512,512],"chunks":[1,256,256]}"#.to_string(),
        )]);
        let err = client.load_levels(1).await.unwrap_err();
        assert!(matches!(err, EngineError::MetadataParse { .. }));
    }

    #[tokio::test]
    async fn test_zero_levels_rejected() {
        let client = client_with(vec![]);
        assert!(matches!(
            client.load_levels(0).await.unwrap_err(),
            EngineError::EmptyPyramid
        ));
    }

    #[test]
    fn test_level_index_from_url() {
        assert_eq!(
            level_index_from_url("http://store.test/image.zarr/7/.zarray"),
            7
        );
        assert_eq!(
            level_index_from_url("http://store.test/image.zarr/0/.zarray"),
            0
        );
    }
}
