//! Line processing and ingestion statistics
//!
//! [`Ingestor`] is the I/O-free half of the reader: it takes raw chunks,
//! reassembles lines, parses them and records the results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::line_buffer::LineBuffer;
use super::parser::{parse, ParseError};
use crate::metrics::MetricRegistry;

/// Lock-free counters describing the ingestion path.
///
/// These stay inside the process; they are logged, not exported.
#[derive(Debug, Default)]
pub struct IngestStats {
    bytes_read: AtomicU64,
    lines: AtomicU64,
    events: AtomicU64,
    rejected: AtomicU64,
    blank: AtomicU64,
    oversized: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_line(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blank(&self) {
        self.blank.fetch_add(1, Ordering::Relaxed);
    }

    fn set_oversized(&self, n: u64) {
        self.oversized.store(n, Ordering::Relaxed);
    }

    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            events: self.events(),
            rejected: self.rejected(),
            blank: self.blank.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of ingestion counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSnapshot {
    pub bytes_read: u64,
    /// Complete lines handed to the parser
    pub lines: u64,
    /// Lines that produced a counter update
    pub events: u64,
    /// Non-blank lines that did not match the grammar
    pub rejected: u64,
    pub blank: u64,
    /// Lines dropped for exceeding the length cap
    pub oversized: u64,
}

/// Reassembles, parses and records log lines.
#[derive(Debug)]
pub struct Ingestor {
    buffer: LineBuffer,
    registry: Arc<MetricRegistry>,
    stats: Arc<IngestStats>,
}

impl Ingestor {
    pub fn new(registry: Arc<MetricRegistry>, max_line_length: usize) -> Self {
        Self {
            buffer: LineBuffer::new(max_line_length),
            registry,
            stats: Arc::new(IngestStats::new()),
        }
    }

    /// Shared handle to the statistics.
    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Consume one raw read and process every line it completes.
    ///
    /// Returns the number of events recorded.
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        self.stats.record_bytes_read(chunk.len() as u64);
        self.buffer.extend(chunk);

        let mut recorded = 0;
        while let Some(line) = self.buffer.next_line() {
            if self.process_line(&line) {
                recorded += 1;
            }
        }
        self.stats.set_oversized(self.buffer.oversized_lines());
        recorded
    }

    /// Parse and record a single complete line.
    pub fn process_line(&self, line: &str) -> bool {
        self.stats.record_line();

        match parse(line) {
            Ok(event) => {
                self.stats.record_event();
                self.registry.record_event(&event);
                trace!(
                    namespace = %event.namespace,
                    host = %event.host,
                    status_code = %event.status_class,
                    "Recorded request"
                );
                true
            }
            Err(ParseError::Empty) => {
                self.stats.record_blank();
                false
            }
            Err(reason) => {
                self.stats.record_rejected();
                trace!(%reason, line, "Discarding unparseable line");
                false
            }
        }
    }

    /// Bytes of an unterminated line still buffered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop the unterminated tail, returning its size.
    pub fn discard_partial(&mut self) -> usize {
        self.buffer.clear()
    }
}
