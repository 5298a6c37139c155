//! Named pipe reader
//!
//! Owns the FIFO descriptor for the lifetime of the process and drives the
//! ingestion loop:
//!
//! ```text
//! Closed ──▶ Opening ──▶ Waiting ◀──▶ Draining
//!                                        │
//!                                        ▼
//!                                      Failed
//! ```
//!
//! The reader parks on descriptor readiness while no bytes are available and
//! reads until the kernel reports `WouldBlock` once they are. There is no
//! polling interval anywhere in the loop.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::unix::pipe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ingestor::{IngestStats, Ingestor};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::metrics::MetricRegistry;

/// Size of a single `read` from the pipe; a full pipe buffer on Linux.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Lifecycle of the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Closed,
    Opening,
    /// Parked until the descriptor is readable
    Waiting,
    /// Reading available bytes and processing complete lines
    Draining,
    /// The pipe reported EOF or an unrecoverable error
    Failed,
}

enum DrainOutcome {
    WouldBlock,
    EndOfFile,
}

/// Reads access log lines from a pre-created named pipe.
pub struct PipeReader {
    path: PathBuf,
    receiver: pipe::Receiver,
    ingestor: Ingestor,
    chunk: Box<[u8]>,
    state: ReaderState,
}

impl PipeReader {
    /// Open the configured FIFO for non-blocking reads.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`Error::PathNotFound`] if the path does not exist; the pipe is never
    /// created here.
    pub fn open(config: &ServiceConfig, registry: Arc<MetricRegistry>) -> Result<Self> {
        let path = config.fifo_path.clone();
        debug!(path = %path.display(), state = ?ReaderState::Opening, "Opening FIFO");

        if !path.exists() {
            return Err(Error::PathNotFound { path });
        }

        let receiver = open_receiver(&path, config.keep_open)?;
        info!(path = %path.display(), keep_open = config.keep_open, "FIFO opened");

        Ok(Self {
            path,
            receiver,
            ingestor: Ingestor::new(registry, config.max_line_length),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            state: ReaderState::Waiting,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.ingestor.stats()
    }

    /// Process the pipe until shutdown is requested or the pipe fails.
    ///
    /// Returns `Ok(())` only on shutdown. EOF from the writer side is
    /// reported as [`Error::StreamClosed`]; the descriptor is not reopened.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!(path = %self.path.display(), "Waiting for FIFO data");

        loop {
            self.state = ReaderState::Waiting;

            let ready = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                ready = self.receiver.readable() => Some(ready),
            };

            match ready {
                None => {
                    self.state = ReaderState::Closed;
                    info!(path = %self.path.display(), "FIFO reader stopped");
                    return Ok(());
                }
                Some(Err(e)) => {
                    self.state = ReaderState::Failed;
                    return Err(e.into());
                }
                Some(Ok(())) => {}
            }

            self.state = ReaderState::Draining;
            match self.drain(&shutdown) {
                Ok(DrainOutcome::WouldBlock) => continue,
                Ok(DrainOutcome::EndOfFile) => {
                    self.state = ReaderState::Failed;
                    let dropped = self.ingestor.discard_partial();
                    if dropped > 0 {
                        debug!(bytes = dropped, "Dropping unterminated line at end-of-file");
                    }
                    warn!(path = %self.path.display(), "FIFO writer closed");
                    return Err(Error::StreamClosed {
                        path: self.path.clone(),
                    });
                }
                Err(e) => {
                    self.state = ReaderState::Failed;
                    return Err(e);
                }
            }
        }
    }

    /// Read until the descriptor would block, processing lines as they complete.
    ///
    /// A pending shutdown cuts the drain short; the loop then exits on its
    /// next wait.
    fn drain(&mut self, shutdown: &CancellationToken) -> Result<DrainOutcome> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(DrainOutcome::WouldBlock);
            }
            match self.receiver.try_read(&mut self.chunk) {
                Ok(0) => return Ok(DrainOutcome::EndOfFile),
                Ok(n) => {
                    self.ingestor.feed(&self.chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(DrainOutcome::WouldBlock);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("pending", &self.ingestor.pending())
            .finish()
    }
}

fn open_receiver(path: &Path, keep_open: bool) -> io::Result<pipe::Receiver> {
    let mut options = pipe::OpenOptions::new();

    // A read-write open keeps a writer reference on the FIFO itself, so
    // writers coming and going never produce EOF.
    #[cfg(target_os = "linux")]
    options.read_write(keep_open);

    #[cfg(not(target_os = "linux"))]
    if keep_open {
        warn!("keep-open is only supported on Linux; opening read-only");
    }

    options.open_receiver(path)
}
