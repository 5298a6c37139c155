//! Error types for the Apache sites exporter

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that terminate the exporter.
///
/// Line-level parse failures are not represented here; see
/// [`ParseError`](crate::ingest::ParseError).
#[derive(Error, Debug)]
pub enum Error {
    /// The configured FIFO does not exist
    #[error("Socket path does not exist: {}", path.display())]
    PathNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The writer side of the FIFO closed permanently
    #[error("FIFO {} reported end-of-file", path.display())]
    StreamClosed { path: PathBuf },

    /// Metric registration or encoding error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Exposition server error
    #[error("Metrics server error: {0}")]
    Server(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error stems from operator configuration rather than runtime I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::PathNotFound { .. } | Error::Config(_))
    }
}
