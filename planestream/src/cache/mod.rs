//! Transport and transparent-cache layer.
//!
//! The engine never talks to the network directly; it goes through the
//! [`Fetcher`] trait. In production a [`CachingFetcher`] wraps an
//! [`HttpFetcher`] so that any previously successful GET is served instantly
//! on an identical GET - the transparent-cache assumption the prefetch
//! director relies on. The engine only ever issues idempotent GET reads and
//! never coordinates writes.

mod fetcher;
mod transparent;

pub use fetcher::{BoxFuture, FetchError, Fetcher, HttpFetcher, NullFetcher};
pub use transparent::CachingFetcher;
