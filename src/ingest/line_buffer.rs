//! Partial-line reassembly
//!
//! Reads from the pipe arrive at arbitrary byte boundaries. [`LineBuffer`]
//! accumulates them and hands out complete, line-feed terminated lines,
//! keeping any trailing fragment for the next read.

use bytes::{Buf, BytesMut};

const INITIAL_CAPACITY: usize = 8 * 1024;

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Prefix of `buf` already known to contain no line-feed
    scanned: usize,
    max_line_length: usize,
    /// Dropping the rest of a line that outgrew `max_line_length`
    discarding: bool,
    oversized: u64,
}

impl LineBuffer {
    /// Create a buffer that drops lines longer than `max_line_length` bytes.
    pub fn new(max_line_length: usize) -> Self {
        let capacity = INITIAL_CAPACITY.min(max_line_length.saturating_add(1));
        Self {
            buf: BytesMut::with_capacity(capacity),
            scanned: 0,
            max_line_length,
            discarding: false,
            oversized: 0,
        }
    }

    /// Append bytes from one read.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its line-feed.
    ///
    /// Returns `None` once only an unterminated fragment (or nothing) is left.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_line_length {
                    if !self.discarding {
                        self.discarding = true;
                        self.oversized += 1;
                    }
                    self.buf.clear();
                    self.scanned = 0;
                }
                return None;
            };

            let end = self.scanned + offset;
            let line = self.buf.split_to(end + 1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if end > self.max_line_length {
                self.oversized += 1;
                continue;
            }

            return Some(String::from_utf8_lossy(&line[..end]).into_owned());
        }
    }

    /// Bytes currently held for an unterminated line.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of lines dropped for exceeding the length cap.
    pub fn oversized_lines(&self) -> u64 {
        self.oversized
    }

    /// Drop any buffered fragment, returning how many bytes were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.buf.remaining();
        self.buf.clear();
        self.scanned = 0;
        self.discarding = false;
        dropped
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_LINE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut LineBuffer) -> Vec<String> {
        std::iter::from_fn(|| buffer.next_line()).collect()
    }

    #[test]
    fn test_single_complete_line() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"hello\n");

        assert_eq!(drain(&mut buffer), vec!["hello"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let line = br#"foo | bar | "GET /x HTTP/1.1" 200 10 2"#;
        let mut buffer = LineBuffer::default();

        buffer.extend(&line[..7]);
        assert!(drain(&mut buffer).is_empty());
        buffer.extend(&line[7..23]);
        assert!(drain(&mut buffer).is_empty());
        buffer.extend(&line[23..]);
        assert!(drain(&mut buffer).is_empty());
        assert_eq!(buffer.len(), line.len());

        buffer.extend(b"\n");
        let lines = drain(&mut buffer);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_bytes(), line);
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"one\ntwo\n\nthree");

        assert_eq!(drain(&mut buffer), vec!["one", "two", ""]);
        assert_eq!(buffer.len(), 5);

        buffer.extend(b"\n");
        assert_eq!(drain(&mut buffer), vec!["three"]);
    }

    #[test]
    fn test_carriage_return_is_kept_for_parser() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"line\r\n");
        assert_eq!(drain(&mut buffer), vec!["line\r"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"ab\xffcd\n");
        assert_eq!(drain(&mut buffer), vec!["ab\u{fffd}cd"]);
    }

    #[test]
    fn test_oversized_fragment_is_discarded() {
        let mut buffer = LineBuffer::new(8);

        buffer.extend(b"0123456789");
        assert!(drain(&mut buffer).is_empty());
        assert!(buffer.is_empty());
        assert_eq!(buffer.oversized_lines(), 1);

        // Tail of the oversized line is dropped, the next line survives.
        buffer.extend(b"abc\nok\n");
        assert_eq!(drain(&mut buffer), vec!["ok"]);
        assert_eq!(buffer.oversized_lines(), 1);
    }

    #[test]
    fn test_oversized_complete_line_is_discarded() {
        let mut buffer = LineBuffer::new(4);
        buffer.extend(b"toolong\nfine\n");

        assert_eq!(drain(&mut buffer), vec!["fine"]);
        assert_eq!(buffer.oversized_lines(), 1);
    }

    #[test]
    fn test_unbounded_line_length() {
        let mut buffer = LineBuffer::new(usize::MAX);
        buffer.extend(b"a line of any length
");

        assert_eq!(drain(&mut buffer), vec!["a line of any length"]);
        assert_eq!(buffer.oversized_lines(), 0);
    }

    #[test]
    fn test_clear_reports_dropped_bytes() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"partial");

        assert_eq!(buffer.clear(), 7);
        assert!(buffer.is_empty());
    }
}
