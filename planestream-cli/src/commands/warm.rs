//! `planestream warm` - bulk pre-warm planes into the transparent cache.
//!
//! Uses the same level-selection and chunk-enumeration logic as the
//! engine's prefetch director, so warmed URLs match what a viewer session
//! will request byte-for-byte.

use std::sync::Arc;

use clap::Args;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use planestream::cache::{CachingFetcher, Fetcher, HttpFetcher};
use planestream::prefetch::{enumerate_chunk_urls, select_levels};
use planestream::store::StoreClient;

use crate::error::CliError;

/// Arguments for the warm subcommand.
#[derive(Debug, Args)]
pub struct WarmArgs {
    /// Store base URL (e.g. https://host/data/image.zarr)
    pub url: String,

    /// Number of resolution levels to load
    #[arg(long, default_value_t = 1)]
    pub levels: usize,

    /// First plane to warm
    #[arg(long, default_value_t = 0)]
    pub start: u32,

    /// Number of planes to warm
    #[arg(long, default_value_t = 1)]
    pub count: u32,

    /// Concurrent fetches
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Skip the finest level when its per-plane chunk count exceeds this
    #[arg(long, default_value_t = 256)]
    pub finest_chunk_cap: u64,
}

/// Run the warm subcommand.
pub async fn run(args: WarmArgs) -> Result<(), CliError> {
    if args.count == 0 {
        return Err(CliError::InvalidArgs(
            "--count must be at least 1".to_string(),
        ));
    }
    if args.concurrency == 0 {
        return Err(CliError::InvalidArgs(
            "--concurrency must be at least 1".to_string(),
        ));
    }

    let http = Arc::new(HttpFetcher::new());
    let client = StoreClient::new(&args.url, http.clone());
    let levels = Arc::new(client.load_levels(args.levels).await?);

    let plane_count = levels.plane_count();
    let end = args.start.saturating_add(args.count).min(plane_count);
    if args.start >= plane_count {
        return Err(CliError::InvalidArgs(format!(
            "start plane {} out of range (store has {} planes)",
            args.start, plane_count
        )));
    }

    let selected = select_levels(&levels, args.finest_chunk_cap);
    let mut urls = Vec::new();
    for plane in args.start..end {
        for &index in &selected {
            if let Some(level) = levels.get(index) {
                urls.extend(enumerate_chunk_urls(
                    client.base_url(),
                    level,
                    plane,
                    0,
                    None,
                    0,
                ));
            }
        }
    }

    println!(
        "Warming planes {}..{} across levels {:?} ({} chunks)",
        args.start,
        end,
        selected,
        urls.len()
    );

    let cache = Arc::new(CachingFetcher::new(http));
    let bar = ProgressBar::new(urls.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} ({eta})")
            .expect("valid progress template"),
    );

    let failures = stream::iter(urls)
        .map(|url| {
            let cache = Arc::clone(&cache);
            let bar = bar.clone();
            async move {
                let failed = match cache.fetch(&url).await {
                    Ok(_) => 0u64,
                    Err(e) => {
                        debug!(url = %url, error = %e, "Warm fetch failed");
                        1
                    }
                };
                bar.inc(1);
                failed
            }
        })
        .buffer_unordered(args.concurrency)
        .fold(0u64, |acc, failed| async move { acc + failed })
        .await;

    bar.finish();
    println!(
        "Done: {} cached entries, {} failures",
        cache.entry_count(),
        failures
    );

    Ok(())
}
