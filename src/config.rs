//! Service configuration
//!
//! The binary maps its command-line flags onto [`ServiceConfig`]; the library
//! never sees the raw arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default FIFO the web server writes its access log into.
pub const DEFAULT_FIFO_PATH: &str = "/run/prometheus-client-apache-sites.stdin";

/// Default exposition port.
pub const DEFAULT_PORT: u16 = 9112;

/// Default cap on a single buffered log line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Configuration for the exporter service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path to the pre-created named pipe
    pub fifo_path: PathBuf,

    /// Metrics server bind address
    pub metrics_addr: SocketAddr,

    /// Also open the FIFO for writing so writer disconnects never read as EOF
    pub keep_open: bool,

    /// Longest line kept in the reassembly buffer before it is dropped
    pub max_line_length: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fifo_path: PathBuf::from(DEFAULT_FIFO_PATH),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            keep_open: false,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServiceConfig {
    /// Parse a bind address given on the command line.
    pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
        addr.parse()
            .map_err(|e| Error::Config(format!("Invalid metrics server address '{}': {}", addr, e)))
    }

    /// Reject values the reader cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.fifo_path.as_os_str().is_empty() {
            return Err(Error::Config("FIFO path must not be empty".to_string()));
        }
        if self.max_line_length == 0 {
            return Err(Error::Config(
                "max line length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
