//! Planestream CLI - probe and pre-warm multi-plane tiled imagery stores.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{probe, warm};

#[derive(Debug, Parser)]
#[command(name = "planestream", version, about = "Probe and pre-warm multi-plane tiled imagery stores")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolution pyramid of a chunk store
    Probe(probe::ProbeArgs),
    /// Pre-warm a range of planes into the transparent cache
    Warm(warm::WarmArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Probe(args) => probe::run(args).await,
        Command::Warm(args) => warm::run(args).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", console::style("error:").red().bold(), e);
        std::process::exit(1);
    }
}
