//! Access log ingestion
//!
//! Turns the byte stream arriving on the named pipe into counter updates.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   bytes   ┌─────────────┐  lines  ┌────────────┐  events  ┌────────────────┐
//! │ PipeReader │──────────▶│ LineBuffer  │────────▶│   parser   │─────────▶│ MetricRegistry │
//! │ (FIFO fd)  │           │ (reassembly)│         │ (grammar)  │          │ (counters)     │
//! └────────────┘           └─────────────┘         └────────────┘          └────────────────┘
//! ```
//!
//! Lines that do not match the grammar are counted and dropped; they never
//! stop the reader. Only pipe-level failures end ingestion.

mod ingestor;
mod line_buffer;
mod parser;
mod pipe_reader;
mod proptest;

pub use ingestor::{IngestSnapshot, IngestStats, Ingestor};
pub use line_buffer::LineBuffer;
pub use parser::{parse, parse_lines, ParseError, RequestEvent, StatusClass};
pub use pipe_reader::{PipeReader, ReaderState};
