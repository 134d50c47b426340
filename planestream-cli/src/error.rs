//! CLI error types.

use thiserror::Error;

/// Errors surfaced to the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine-level failure (metadata load, configuration).
    #[error("{0}")]
    Engine(#[from] planestream::EngineError),

    /// Invalid command-line arguments.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}
