//! In-flight fetch registry.
//!
//! The registry is the sole mutual-exclusion mechanism for prefetch claims:
//! a URL can be fetched only by whoever inserted its entry. There is no
//! lock around the fetch itself, only this map acting as a claim-check, so
//! at most one request per URL is outstanding at any time.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Map from URL to the cancellation token of its in-flight fetch.
///
/// Exclusively owned by the prefetch director; no other component mutates
/// it.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    inner: DashMap<String, CancellationToken>,
}

impl InFlightRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a URL for fetching.
    ///
    /// Returns the new fetch's cancellation token, or `None` when another
    /// fetch (possibly triggered by a different predicted plane) already
    /// covers this URL. Insertion is atomic via the map's entry API.
    pub fn claim(&self, url: &str) -> Option<CancellationToken> {
        match self.inner.entry(url.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let token = CancellationToken::new();
                vacant.insert(token.clone());
                Some(token)
            }
        }
    }

    /// Release a URL after its fetch completed, failed, or was cancelled.
    pub fn release(&self, url: &str) {
        self.inner.remove(url);
    }

    /// Whether a URL is currently claimed.
    pub fn contains(&self, url: &str) -> bool {
        self.inner.contains_key(url)
    }

    /// Number of in-flight claims.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Cancel every in-flight fetch whose URL is not in `relevant`.
    ///
    /// Cancellation is cooperative: the token is cancelled here, but entry
    /// removal happens in the fetch task's own completion path. Returns how
    /// many fetches were cancelled.
    pub fn cancel_not_in(&self, relevant: &HashSet<String>) -> usize {
        let mut cancelled = 0;
        for entry in self.inner.iter() {
            if !relevant.contains(entry.key()) {
                entry.value().cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel every in-flight fetch.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.inner.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        cancelled
    }
}
