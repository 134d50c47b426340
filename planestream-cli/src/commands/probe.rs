//! `planestream probe` - inspect a store's resolution pyramid.

use std::sync::Arc;

use clap::Args;

use planestream::cache::HttpFetcher;
use planestream::store::StoreClient;

use crate::error::CliError;

/// Arguments for the probe subcommand.
#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Store base URL (e.g. https://host/data/image.zarr)
    pub url: String,

    /// Number of resolution levels to load
    #[arg(long, default_value_t = 1)]
    pub levels: usize,
}

/// Run the probe subcommand.
pub async fn run(args: ProbeArgs) -> Result<(), CliError> {
    if args.levels == 0 {
        return Err(CliError::InvalidArgs(
            "--levels must be at least 1".to_string(),
        ));
    }

    let client = StoreClient::new(&args.url, Arc::new(HttpFetcher::new()));
    let levels = client.load_levels(args.levels).await?;

    println!("Store: {}", client.base_url());
    println!("Planes: {}", levels.plane_count());
    println!();
    println!(
        "{:<6} {:>10} {:>10} {:>8} {:>8} {:>10} {:>4}",
        "level", "width", "height", "grid y", "grid x", "chunks/pl", "sep"
    );
    for level in levels.iter() {
        println!(
            "{:<6} {:>10} {:>10} {:>8} {:>8} {:>10} {:>4}",
            level.index,
            level.width(),
            level.height(),
            level.grid_rows(),
            level.grid_cols(),
            level.chunks_per_plane(),
            level.separator,
        );
    }

    Ok(())
}
