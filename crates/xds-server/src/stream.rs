//! Stream context, nonces and watch bookkeeping shared by both protocols.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use xds_cache::{ShardedCache, WatchId};
use xds_core::NodeId;

/// Unique identifier for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    /// Generate a new unique stream ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Context for an active discovery stream.
///
/// Owned by the connection task, so plain fields are enough.
#[derive(Debug)]
pub struct StreamContext {
    id: StreamId,
    node: Option<NodeId>,
    created_at: Instant,
    requests: u64,
    responses: u64,
}

impl StreamContext {
    /// Create a new stream context.
    pub fn new() -> Self {
        Self {
            id: StreamId::new(),
            node: None,
            created_at: Instant::now(),
            requests: 0,
            responses: 0,
        }
    }

    /// Get the stream ID.
    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Node bound to this stream by its first request.
    #[inline]
    pub fn node(&self) -> Option<&NodeId> {
        self.node.as_ref()
    }

    /// Bind the node.
    pub fn set_node(&mut self, node: NodeId) {
        self.node = Some(node);
    }

    /// Get stream duration.
    #[inline]
    pub fn duration(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Record a request.
    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    /// Record a response.
    pub fn record_response(&mut self) {
        self.responses += 1;
    }

    /// Requests received so far.
    #[inline]
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    /// Responses sent so far.
    #[inline]
    pub fn response_count(&self) -> u64 {
        self.responses
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Nonce flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoncePrefix {
    /// State-of-the-world responses.
    SotW,
    /// Incremental responses, prefixed with `d`.
    Delta,
}

/// Generate a response nonce: `{timestamp_hex}-{counter_hex}`.
///
/// The counter keeps nonces unique within the process even when the clock
/// does not move between calls.
pub fn generate_nonce(prefix: NoncePrefix) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    match prefix {
        NoncePrefix::SotW => format!("{ts:x}-{count:x}"),
        NoncePrefix::Delta => format!("d{ts:x}-{count:x}"),
    }
}

/// Watches held by one stream, cancelled together on drop.
#[derive(Debug)]
pub(crate) struct WatchSet {
    cache: Arc<ShardedCache>,
    ids: Vec<WatchId>,
}

impl WatchSet {
    pub(crate) fn new(cache: Arc<ShardedCache>) -> Self {
        Self {
            cache,
            ids: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, id: WatchId) {
        self.ids.push(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

impl Drop for WatchSet {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.cache.cancel_watch(id);
        }
    }
}
