//! Metrics module
//!
//! Provides the per-site counter families exposed to Prometheus.

mod registry;

pub use registry::{
    sample_value, MetricRegistry, BYTES_RECEIVED_METRIC, BYTES_SENT_METRIC, REQUESTS_METRIC,
};
