//! Apache Sites Exporter
//!
//! Reads per-site access log lines from a named pipe and exposes request
//! and byte counters per namespace and virtual host for Prometheus to scrape.
//!
//! # Architecture
//!
//! ```text
//! FIFO ─▶ PipeReader ─▶ LineBuffer ─▶ parser ─▶ MetricRegistry ◀─ MetricsServer ◀─ scrape
//! ```
//!
//! The reader and the server run as independent tasks. The registry is the
//! only state they share.
//!
//! # Modules
//!
//! - [`config`] - Service configuration and defaults
//! - [`error`] - Error types
//! - [`ingest`] - Pipe reading, line reassembly and the log grammar
//! - [`metrics`] - Counter families and text exposition
//! - [`server`] - HTTP exposition endpoint

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod server;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use ingest::{parse, PipeReader, RequestEvent, StatusClass};
pub use metrics::MetricRegistry;
pub use server::MetricsServer;
