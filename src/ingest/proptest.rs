//! Property-Based Tests for the Access Log Grammar
//!
//! # Test Properties
//!
//! 1. **Roundtrip**: a well-formed line parses back into exactly its fields
//! 2. **Rejection**: lowercase methods, bad statuses and non-numeric counts never parse
//! 3. **Totality**: arbitrary input never panics the parser
//! 4. **Reassembly**: chunk boundaries never change the lines a buffer emits

#![cfg(test)]

use proptest::prelude::*;

use super::line_buffer::LineBuffer;
use super::parser::{parse, ParseError, StatusClass};

// =============================================================================
// Property Strategies
// =============================================================================

fn namespace_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9._-]{0,20}"
}

fn host_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9.-]{0,40}"
}

fn method_strategy() -> impl Strategy<Value = String> {
    "[A-Z]{1,8}"
}

/// Paths may contain spaces but never start with one.
fn path_strategy() -> impl Strategy<Value = String> {
    "/[A-Za-z0-9/._?=&% -]{0,60}"
}

fn protocol_strategy() -> impl Strategy<Value = String> {
    (0u8..=9, 0u8..=9).prop_map(|(major, minor)| format!("HTTP/{}.{}", major, minor))
}

#[allow(clippy::too_many_arguments)]
fn format_line(
    namespace: &str,
    host: &str,
    method: &str,
    path: &str,
    protocol: &str,
    status: u16,
    received: u64,
    sent: u64,
) -> String {
    format!(
        r#"{} | {} | "{} {} {}" {:03} {} {}"#,
        namespace, host, method, path, protocol, status, received, sent
    )
}

// =============================================================================
// Roundtrip Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: every field of a well-formed line survives parsing unchanged.
    #[test]
    fn prop_roundtrip_fields(
        namespace in namespace_strategy(),
        host in host_strategy(),
        method in method_strategy(),
        path in path_strategy(),
        protocol in protocol_strategy(),
        status in 100u16..=599,
        received in any::<u64>(),
        sent in any::<u64>(),
    ) {
        let line = format_line(&namespace, &host, &method, &path, &protocol, status, received, sent);
        let event = parse(&line).map_err(|e| TestCaseError::fail(format!("{}: {}", line, e)))?;

        prop_assert_eq!(&event.namespace, &namespace);
        prop_assert_eq!(&event.host, &host);
        prop_assert_eq!(&event.method, &method);
        prop_assert_eq!(&event.path, &path);
        prop_assert_eq!(&event.protocol, &protocol);
        prop_assert_eq!(event.status, status);
        prop_assert_eq!(Some(event.status_class), StatusClass::from_status(status));
        prop_assert_eq!(event.bytes_received, received);
        prop_assert_eq!(event.bytes_sent, sent);
    }

    /// Property: the status class label is the leading digit plus "xx".
    #[test]
    fn prop_status_class_label(status in 100u16..=599) {
        let class = StatusClass::from_status(status).unwrap();
        prop_assert_eq!(class.as_str(), format!("{}xx", status / 100));
    }
}

// =============================================================================
// Rejection Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: a method with any lowercase letter is rejected.
    #[test]
    fn prop_lowercase_method_rejected(
        method in "[A-Z]{0,3}[a-z][A-Za-z]{0,3}",
        status in 100u16..=599,
    ) {
        let line = format_line("ns", "host", &method, "/", "HTTP/1.1", status, 1, 1);
        prop_assert_eq!(parse(&line), Err(ParseError::InvalidMethod));
    }

    /// Property: non-numeric byte counts never produce an event.
    #[test]
    fn prop_non_numeric_bytes_rejected(count in "[0-9]{0,3}[a-zA-Z+-][0-9a-z]{0,3}") {
        let line = format!(r#"ns | host | "GET / HTTP/1.1" 200 {} 0"#, count);
        prop_assert_eq!(parse(&line), Err(ParseError::InvalidByteCount("bytes_received")));
    }

    /// Property: statuses that are not exactly three digits are rejected.
    #[test]
    fn prop_bad_status_rejected(status in "[0-9]{1,2}|[0-9]{4,6}") {
        let line = format!(r#"ns | host | "GET / HTTP/1.1" {} 1 1"#, status);
        prop_assert_eq!(parse(&line), Err(ParseError::InvalidStatus));
    }

    /// Property: arbitrary input never panics the parser.
    #[test]
    fn prop_parse_is_total(input in any::<String>()) {
        let _ = parse(&input);
    }
}

// =============================================================================
// Reassembly Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: splitting a stream at arbitrary offsets yields the same lines.
    #[test]
    fn prop_chunking_is_transparent(
        lines in prop::collection::vec("[ -~]{0,40}", 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let stream = lines.iter().map(|l| format!("{}\n", l)).collect::<String>();
        let bytes = stream.as_bytes();

        let mut offsets: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
        offsets.push(0);
        offsets.push(bytes.len());
        offsets.sort_unstable();
        offsets.dedup();

        let mut buffer = LineBuffer::new(1024);
        let mut emitted = Vec::new();
        for window in offsets.windows(2) {
            buffer.extend(&bytes[window[0]..window[1]]);
            while let Some(line) = buffer.next_line() {
                emitted.push(line);
            }
        }

        prop_assert_eq!(emitted, lines);
        prop_assert!(buffer.is_empty());
    }
}
