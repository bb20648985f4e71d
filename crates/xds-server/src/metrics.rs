//! Server metrics.
//!
//! Recorded through the `metrics` facade, so any installed recorder
//! (Prometheus or otherwise) picks them up:
//!
//! - Requests, pushes, ACKs and NACKs per resource kind
//! - Stale nonces and unknown type URLs
//! - Open streams and stream duration per protocol
//!
//! # Example
//!
//! ```rust
//! use xds_core::ResourceKind;
//! use xds_server::metrics::XdsMetrics;
//!
//! let metrics = XdsMetrics::new();
//! metrics.record_request(ResourceKind::Cluster);
//! metrics.record_push(ResourceKind::Cluster, 3);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use xds_core::ResourceKind;

/// Metrics for the xDS server.
#[derive(Debug, Clone)]
pub struct XdsMetrics {
    inner: Arc<XdsMetricsInner>,
}

#[derive(Debug)]
struct XdsMetricsInner {
    active_streams: AtomicU64,
    nacks: AtomicU64,
}

impl Default for XdsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl XdsMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(XdsMetricsInner {
                active_streams: AtomicU64::new(0),
                nacks: AtomicU64::new(0),
            }),
        }
    }

    /// Record an incoming request.
    pub fn record_request(&self, kind: ResourceKind) {
        counter!("xds_requests_total", "kind" => kind.short_name()).increment(1);
    }

    /// Record a push and how many resources it carried.
    pub fn record_push(&self, kind: ResourceKind, resources: usize) {
        counter!("xds_pushes_total", "kind" => kind.short_name()).increment(1);
        histogram!("xds_push_resources", "kind" => kind.short_name()).record(resources as f64);
    }

    /// Record an ACK.
    pub fn record_ack(&self, kind: ResourceKind) {
        counter!("xds_acks_total", "kind" => kind.short_name()).increment(1);
    }

    /// Record a NACK.
    pub fn record_nack(&self, kind: ResourceKind) {
        self.inner.nacks.fetch_add(1, Ordering::Relaxed);
        counter!("xds_nacks_total", "kind" => kind.short_name()).increment(1);
    }

    /// Record a request carrying a nonce that is no longer outstanding.
    pub fn record_stale_nonce(&self, kind: ResourceKind) {
        counter!("xds_stale_nonces_total", "kind" => kind.short_name()).increment(1);
    }

    /// Record a request for a type URL the server does not serve.
    pub fn record_unknown_type(&self) {
        counter!("xds_unknown_type_urls_total").increment(1);
    }

    /// Record a stream refused before any session started.
    pub fn record_refused_stream(&self, protocol: &'static str) {
        counter!("xds_streams_refused_total", "protocol" => protocol).increment(1);
    }

    /// Record a stream opened.
    pub fn stream_opened(&self, protocol: &'static str) {
        let count = self.inner.active_streams.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("xds_streams_opened_total", "protocol" => protocol).increment(1);
        gauge!("xds_active_streams").set(count as f64);
    }

    /// Record a stream closed.
    pub fn stream_closed(&self, protocol: &'static str, duration: Duration) {
        let count = self
            .inner
            .active_streams
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        counter!("xds_streams_closed_total", "protocol" => protocol).increment(1);
        gauge!("xds_active_streams").set(count as f64);
        histogram!("xds_stream_duration_seconds", "protocol" => protocol)
            .record(duration.as_secs_f64());
    }

    /// Get the current number of active streams.
    pub fn active_streams(&self) -> u64 {
        self.inner.active_streams.load(Ordering::Relaxed)
    }

    /// Get the number of NACKs seen since startup.
    pub fn nack_count(&self) -> u64 {
        self.inner.nacks.load(Ordering::Relaxed)
    }
}

/// Stream duration tracker.
///
/// Records stream duration when dropped.
#[derive(Debug)]
pub struct StreamTracker {
    start: Instant,
    protocol: &'static str,
    metrics: XdsMetrics,
}

impl StreamTracker {
    /// Create a new stream tracker.
    pub fn new(metrics: XdsMetrics, protocol: &'static str) -> Self {
        metrics.stream_opened(protocol);
        Self {
            start: Instant::now(),
            protocol,
            metrics,
        }
    }
}

impl Drop for StreamTracker {
    fn drop(&mut self) {
        self.metrics
            .stream_closed(self.protocol, self.start.elapsed());
    }
}
