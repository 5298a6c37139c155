//! Access Log Line Parser
//!
//! Tokenizes one access log record of the fixed per-site format:
//!
//! ```text
//! <namespace> | <host> | "<METHOD> <path> HTTP/<major>.<minor>" <status> <bytes_received> <bytes_sent>
//! ```
//!
//! Each field is split on its fixed delimiter and validated on its own, so every
//! rejection maps to exactly one [`ParseError`] variant. There is no best-effort
//! mode: a line either yields a complete [`RequestEvent`] or nothing.

use std::fmt;

use thiserror::Error;

/// Separator between namespace, host and the request section.
const FIELD_DELIMITER: &str = " | ";

// =============================================================================
// Status Class
// =============================================================================

/// HTTP status class, the leading status digit followed by `xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
}

impl StatusClass {
    /// Classify a three-digit status code. Codes outside 100..=599 have no class.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            100..=199 => Some(StatusClass::Informational),
            200..=299 => Some(StatusClass::Success),
            300..=399 => Some(StatusClass::Redirection),
            400..=499 => Some(StatusClass::ClientError),
            500..=599 => Some(StatusClass::ServerError),
            _ => None,
        }
    }

    /// Label value used in the `status_code` dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Informational => "1xx",
            StatusClass::Success => "2xx",
            StatusClass::Redirection => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Request Event
// =============================================================================

/// One successfully parsed access log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    /// Logical tenant / site identifier
    pub namespace: String,
    /// Virtual host name
    pub host: String,
    /// Request method, e.g. `GET`
    pub method: String,
    /// Request target as logged
    pub path: String,
    /// Protocol token, e.g. `HTTP/1.1`
    pub protocol: String,
    /// Three-digit status code
    pub status: u16,
    /// Class derived from `status`
    pub status_class: StatusClass,
    /// Request size in bytes
    pub bytes_received: u64,
    /// Response size in bytes
    pub bytes_sent: u64,
}

// =============================================================================
// Parse Errors
// =============================================================================

/// Reasons a line does not match the grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank or whitespace-only input
    #[error("empty line")]
    Empty,

    /// A required field is absent
    #[error("missing {0} field")]
    MissingField(&'static str),

    /// Namespace or host is empty or contains `|`
    #[error("invalid {0} label")]
    InvalidLabel(&'static str),

    /// The request section is not enclosed in double quotes
    #[error("request line is not quoted")]
    UnquotedRequest,

    /// Method is not an uppercase token
    #[error("invalid request method")]
    InvalidMethod,

    /// Protocol is not `HTTP/<digit>.<digit>`
    #[error("invalid protocol version")]
    InvalidProtocol,

    /// Status is not exactly three digits
    #[error("invalid status code")]
    InvalidStatus,

    /// Status digits outside 1xx..5xx
    #[error("unsupported status class for status {0}")]
    UnsupportedStatusClass(u16),

    /// Byte count is not an unsigned decimal that fits in 64 bits
    #[error("invalid {0} byte count")]
    InvalidByteCount(&'static str),

    /// Extra tokens after the sent byte count
    #[error("unexpected trailing data")]
    TrailingData,
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a single access log record.
///
/// Surrounding whitespace (including a trailing `\r`) is ignored.
pub fn parse(line: &str) -> Result<RequestEvent, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut sections = line.splitn(3, FIELD_DELIMITER);
    let namespace = parse_label(sections.next(), "namespace")?;
    let host = parse_label(sections.next(), "host")?;
    let request = sections.next().ok_or(ParseError::MissingField("request"))?;

    // The path may itself contain quotes; the trailer never does.
    let quoted = request
        .strip_prefix('"')
        .ok_or(ParseError::UnquotedRequest)?;
    let close = quoted.rfind('"').ok_or(ParseError::UnquotedRequest)?;
    let (request_line, trailer) = (&quoted[..close], &quoted[close + 1..]);

    let (method, path, protocol) = parse_request_line(request_line)?;
    let (status, bytes_received, bytes_sent) = parse_trailer(trailer)?;
    let status_class =
        StatusClass::from_status(status).ok_or(ParseError::UnsupportedStatusClass(status))?;

    Ok(RequestEvent {
        namespace: namespace.to_string(),
        host: host.to_string(),
        method: method.to_string(),
        path: path.to_string(),
        protocol: protocol.to_string(),
        status,
        status_class,
        bytes_received,
        bytes_sent,
    })
}

/// Parse every physical line of a buffer holding several records.
pub fn parse_lines(buffer: &str) -> impl Iterator<Item = Result<RequestEvent, ParseError>> + '_ {
    buffer.lines().map(parse)
}

fn parse_label<'a>(field: Option<&'a str>, name: &'static str) -> Result<&'a str, ParseError> {
    let value = field.ok_or(ParseError::MissingField(name))?;
    if value.is_empty() || value.contains('|') {
        return Err(ParseError::InvalidLabel(name));
    }
    Ok(value)
}

/// `<METHOD> <path> <protocol>`; the path may contain spaces.
fn parse_request_line(request_line: &str) -> Result<(&str, &str, &str), ParseError> {
    let (method, target) = request_line
        .split_once(' ')
        .ok_or(ParseError::MissingField("path"))?;
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ParseError::InvalidMethod);
    }

    let (path, protocol) = target
        .rsplit_once(' ')
        .ok_or(ParseError::MissingField("protocol"))?;
    if path.is_empty() {
        return Err(ParseError::MissingField("path"));
    }
    if !is_http_version(protocol) {
        return Err(ParseError::InvalidProtocol);
    }

    Ok((method, path, protocol))
}

fn is_http_version(protocol: &str) -> bool {
    match protocol.strip_prefix("HTTP/").map(str::as_bytes) {
        Some([major, b'.', minor]) => major.is_ascii_digit() && minor.is_ascii_digit(),
        _ => false,
    }
}

/// ` <status> <bytes_received> <bytes_sent>` following the closing quote.
fn parse_trailer(trailer: &str) -> Result<(u16, u64, u64), ParseError> {
    let trailer = trailer
        .strip_prefix(' ')
        .ok_or(ParseError::MissingField("status"))?;

    let mut tokens = trailer.split(' ');
    let status = tokens.next().ok_or(ParseError::MissingField("status"))?;
    let received = tokens
        .next()
        .ok_or(ParseError::MissingField("bytes_received"))?;
    let sent = tokens.next().ok_or(ParseError::MissingField("bytes_sent"))?;

    let fields = (
        parse_status(status)?,
        parse_byte_count(received, "bytes_received")?,
        parse_byte_count(sent, "bytes_sent")?,
    );
    if tokens.next().is_some() {
        return Err(ParseError::TrailingData);
    }
    Ok(fields)
}

fn parse_status(token: &str) -> Result<u16, ParseError> {
    if token.len() != 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidStatus);
    }
    token.parse().map_err(|_| ParseError::InvalidStatus)
}

fn parse_byte_count(token: &str, name: &'static str) -> Result<u64, ParseError> {
    // u64::from_str would also take a leading '+'
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidByteCount(name));
    }
    token
        .parse()
        .map_err(|_| ParseError::InvalidByteCount(name))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = r#"svc-a | www.example.com | "GET /index.html HTTP/1.1" 200 512 10240"#;

    #[test]
    fn test_parse_sample_line() {
        let event = parse(SAMPLE).unwrap();

        assert_eq!(event.namespace, "svc-a");
        assert_eq!(event.host, "www.example.com");
        assert_eq!(event.method, "GET");
        assert_eq!(event.path, "/index.html");
        assert_eq!(event.protocol, "HTTP/1.1");
        assert_eq!(event.status, 200);
        assert_eq!(event.status_class, StatusClass::Success);
        assert_eq!(event.bytes_received, 512);
        assert_eq!(event.bytes_sent, 10240);
    }

    #[test]
    fn test_status_class_bucketing() {
        let cases = [
            (200, "2xx"),
            (301, "3xx"),
            (404, "4xx"),
            (500, "5xx"),
            (503, "5xx"),
            (101, "1xx"),
        ];

        for (status, expected) in cases {
            let line = format!(r#"ns | host | "GET / HTTP/1.1" {} 0 0"#, status);
            let event = parse(&line).unwrap();
            assert_eq!(event.status_class.as_str(), expected, "status {}", status);
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let line = format!("  {}\r\n", SAMPLE);
        assert!(parse(&line).is_ok());
    }

    #[test]
    fn test_path_with_spaces_and_quotes() {
        let line = r#"ns | host | "GET /a b/"c" HTTP/1.0" 404 1 2"#;
        let event = parse(line).unwrap();
        assert_eq!(event.path, r#"/a b/"c""#);
        assert_eq!(event.protocol, "HTTP/1.0");
    }

    #[test]
    fn test_empty_and_blank_lines() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   \t  "), Err(ParseError::Empty));
        assert_eq!(parse("\n"), Err(ParseError::Empty));
    }

    #[test]
    fn test_missing_fields() {
        assert_matches!(parse("only-namespace"), Err(ParseError::MissingField("host")));
        assert_matches!(parse("ns | host"), Err(ParseError::MissingField("request")));
        assert_matches!(
            parse(r#"ns | host | "GET / HTTP/1.1""#),
            Err(ParseError::MissingField("status"))
        );
        assert_matches!(
            parse(r#"ns | host | "GET / HTTP/1.1" 200"#),
            Err(ParseError::MissingField("bytes_received"))
        );
        assert_matches!(
            parse(r#"ns | host | "GET / HTTP/1.1" 200 10"#),
            Err(ParseError::MissingField("bytes_sent"))
        );
        assert_matches!(
            parse(r#"ns | host | "GET HTTP/1.1" 200 1 2"#),
            Err(ParseError::MissingField("protocol"))
        );
        assert_matches!(
            parse(r#"ns | host | "GET  HTTP/1.1" 200 1 2"#),
            Err(ParseError::MissingField("path"))
        );
    }

    #[test]
    fn test_invalid_labels() {
        assert_matches!(
            parse(r#"ns | ho|st | "GET / HTTP/1.1" 200 1 2"#),
            Err(ParseError::InvalidLabel("host"))
        );
        assert_matches!(
            parse(r#"| host | "GET / HTTP/1.1" 200 1 2"#),
            Err(ParseError::InvalidLabel("namespace"))
        );
    }

    #[test]
    fn test_unquoted_request() {
        assert_matches!(
            parse("ns | host | GET / HTTP/1.1 200 1 2"),
            Err(ParseError::UnquotedRequest)
        );
        assert_matches!(
            parse(r#"ns | host | "GET / HTTP/1.1 200 1 2"#),
            Err(ParseError::UnquotedRequest)
        );
    }

    #[test]
    fn test_lowercase_method_rejected() {
        assert_matches!(
            parse(r#"ns | host | "get / HTTP/1.1" 200 1 2"#),
            Err(ParseError::InvalidMethod)
        );
        assert_matches!(
            parse(r#"ns | host | "Get / HTTP/1.1" 200 1 2"#),
            Err(ParseError::InvalidMethod)
        );
    }

    #[test]
    fn test_invalid_protocol() {
        for protocol in ["HTTP/2", "HTTP/1.10", "http/1.1", "SPDY/3.1", "HTTP/x.1"] {
            let line = format!(r#"ns | host | "GET / {}" 200 1 2"#, protocol);
            assert_eq!(parse(&line), Err(ParseError::InvalidProtocol), "{}", protocol);
        }
    }

    #[test]
    fn test_invalid_status() {
        for status in ["20", "2000", "2x0", "-20", "abc"] {
            let line = format!(r#"ns | host | "GET / HTTP/1.1" {} 1 2"#, status);
            assert_eq!(parse(&line), Err(ParseError::InvalidStatus), "{}", status);
        }
    }

    #[test]
    fn test_unsupported_status_class() {
        assert_eq!(
            parse(r#"ns | host | "GET / HTTP/1.1" 099 1 2"#),
            Err(ParseError::UnsupportedStatusClass(99))
        );
        assert_eq!(
            parse(r#"ns | host | "GET / HTTP/1.1" 600 1 2"#),
            Err(ParseError::UnsupportedStatusClass(600))
        );
    }

    #[test]
    fn test_invalid_byte_counts() {
        assert_matches!(
            parse(r#"ns | host | "GET / HTTP/1.1" 200 - 2"#),
            Err(ParseError::InvalidByteCount("bytes_received"))
        );
        assert_matches!(
            parse(r#"ns | host | "GET / HTTP/1.1" 200 1 +2"#),
            Err(ParseError::InvalidByteCount("bytes_sent"))
        );
        assert_matches!(
            parse(r#"ns | host | "GET / HTTP/1.1" 200  1 2"#),
            Err(ParseError::InvalidByteCount("bytes_received"))
        );
    }

    #[test]
    fn test_byte_count_overflow_is_rejected() {
        let max = format!(r#"ns | host | "GET / HTTP/1.1" 200 {} 0"#, u64::MAX);
        assert_eq!(parse(&max).unwrap().bytes_received, u64::MAX);

        let overflow = r#"ns | host | "GET / HTTP/1.1" 200 18446744073709551616 0"#;
        assert_eq!(
            parse(overflow),
            Err(ParseError::InvalidByteCount("bytes_received"))
        );
    }

    #[test]
    fn test_trailing_data() {
        assert_eq!(
            parse(r#"ns | host | "GET / HTTP/1.1" 200 1 2 3"#),
            Err(ParseError::TrailingData)
        );
    }

    #[test]
    fn test_parse_lines_splits_records() {
        let buffer = format!("{}\n\nnot a log line\n{}\n", SAMPLE, SAMPLE);
        let results: Vec<_> = parse_lines(&buffer).collect();

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(ParseError::Empty));
        assert!(results[2].is_err());
        assert!(results[3].is_ok());
    }

    #[test]
    fn test_status_class_display() {
        assert_eq!(StatusClass::ClientError.to_string(), "4xx");
        assert_eq!(StatusClass::from_status(42), None);
    }
}
