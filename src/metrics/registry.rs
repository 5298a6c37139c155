//! Metric Registry
//!
//! Owns the three per-site counter families and renders them for scrapes.
//! Each instance wraps its own `prometheus::Registry`, so nothing is
//! registered globally and tests can build as many registries as they like.

use parking_lot::RwLock;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::debug;

use crate::error::Result;
use crate::ingest::{RequestEvent, StatusClass};

/// Requests per namespace, host and status class.
pub const REQUESTS_METRIC: &str = "apache_sites_requests";

/// Request bytes per namespace and host.
pub const BYTES_RECEIVED_METRIC: &str = "apache_sites_bytes_received";

/// Response bytes per namespace and host.
pub const BYTES_SENT_METRIC: &str = "apache_sites_bytes_sent";

const SITE_LABELS: &[&str] = &["namespace", "host"];
const REQUEST_LABELS: &[&str] = &["namespace", "host", "status_code"];

/// Thread-safe per-site request counters.
///
/// Label tuples are created on first observation and live for the rest of
/// the process; counters only ever increase.
pub struct MetricRegistry {
    registry: Registry,
    requests: IntCounterVec,
    bytes_received: IntCounterVec,
    bytes_sent: IntCounterVec,
    /// Held for writing while a multi-counter update is applied and for
    /// reading while a scrape gathers, so scrapes never see half an update.
    commit: RwLock<()>,
}

impl MetricRegistry {
    /// Create a registry with all three families registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(REQUESTS_METRIC, "Number of requests processed"),
            REQUEST_LABELS,
        )?;
        let bytes_received = IntCounterVec::new(
            Opts::new(BYTES_RECEIVED_METRIC, "Bytes received"),
            SITE_LABELS,
        )?;
        let bytes_sent =
            IntCounterVec::new(Opts::new(BYTES_SENT_METRIC, "Bytes sent"), SITE_LABELS)?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(bytes_received.clone()))?;
        registry.register(Box::new(bytes_sent.clone()))?;

        debug!("Registered apache_sites counter families");

        Ok(Self {
            registry,
            requests,
            bytes_received,
            bytes_sent,
            commit: RwLock::new(()),
        })
    }

    /// Count one request for `(namespace, host, status_class)`.
    pub fn record_request(&self, namespace: &str, host: &str, status_class: StatusClass) {
        self.requests
            .with_label_values(&[namespace, host, status_class.as_str()])
            .inc();
    }

    /// Add both byte counts for `(namespace, host)` as a single update.
    pub fn record_bytes(&self, namespace: &str, host: &str, bytes_received: u64, bytes_sent: u64) {
        let _commit = self.commit.write();
        self.add_bytes(namespace, host, bytes_received, bytes_sent);
    }

    /// Apply every counter a parsed event contributes to as a single update.
    pub fn record_event(&self, event: &RequestEvent) {
        let _commit = self.commit.write();
        self.record_request(&event.namespace, &event.host, event.status_class);
        self.add_bytes(
            &event.namespace,
            &event.host,
            event.bytes_received,
            event.bytes_sent,
        );
    }

    /// Caller must hold the commit write guard.
    fn add_bytes(&self, namespace: &str, host: &str, bytes_received: u64, bytes_sent: u64) {
        let labels = [namespace, host];
        saturating_inc_by(&self.bytes_received.with_label_values(&labels), bytes_received);
        saturating_inc_by(&self.bytes_sent.with_label_values(&labels), bytes_sent);
    }

    /// Collect a point-in-time view of all families.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let _commit = self.commit.read();
        self.registry.gather()
    }

    /// Encode the current state in the text exposition format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let families = self.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }

    /// Render the current state as exposition text.
    pub fn snapshot(&self) -> Result<String> {
        let families = self.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }

    /// `Content-Type` of the output of [`encode`](Self::encode).
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

/// Add `v` to `counter`, stopping at `u64::MAX` instead of wrapping.
fn saturating_inc_by(counter: &IntCounter, v: u64) {
    let headroom = u64::MAX - counter.get();
    counter.inc_by(v.min(headroom));
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry").finish_non_exhaustive()
    }
}

/// Read one sample value out of exposition text.
///
/// Returns `None` when no series of `name` carries all of `labels`. Used by
/// tests to check scrapes without creating series as a side effect.
#[doc(hidden)]
pub fn sample_value(exposition: &str, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| {
            labels
                .iter()
                .all(|(key, value)| line.contains(&format!("{}=\"{}\"", key, value)))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| {
            value
                .parse::<u64>()
                .ok()
                .or_else(|| value.parse::<f64>().ok().map(|v| v as u64))
        })
}

// =============================================================================
// Tests
// =============================================================================
