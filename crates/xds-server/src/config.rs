//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the xDS server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Enable State-of-the-World protocol.
    pub enable_sotw: bool,
    /// Enable Delta xDS protocol.
    pub enable_delta: bool,
    /// Maximum concurrent streams per connection.
    pub max_concurrent_streams: Option<u32>,
    /// Keepalive interval.
    pub keepalive_interval: Option<Duration>,
    /// Keepalive timeout.
    pub keepalive_timeout: Option<Duration>,
    /// Maximum decoded request size in bytes.
    pub max_request_size: usize,
    /// Responses buffered per stream before the connection task waits.
    pub response_buffer_size: usize,
    /// How long shutdown waits for open streams to finish.
    pub grace_period: Duration,
    /// Refuse streams from nodes that have no resources in the store.
    ///
    /// On by default; turn it off to let proxies connect before their
    /// first write.
    pub require_known_node: bool,
    /// Identifier sent as `control_plane` in every response.
    pub control_plane_id: Option<String>,
    /// Debug HTTP API.
    pub debug_api: DebugApiConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enable_sotw: true,
            enable_delta: false,
            max_concurrent_streams: Some(100),
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_timeout: Some(Duration::from_secs(10)),
            max_request_size: 4 * 1024 * 1024, // 4MB
            response_buffer_size: 16,
            grace_period: Duration::from_secs(30),
            require_known_node: true,
            control_plane_id: None,
            debug_api: DebugApiConfig::default(),
        }
    }
}

/// Debug HTTP API configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugApiConfig {
    /// Serve the debug API.
    pub enabled: bool,
    /// Listen address.
    pub addr: SocketAddr,
}

impl Default for DebugApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: SocketAddr::from(([127, 0, 0, 1], 9901)),
        }
    }
}

impl DebugApiConfig {
    /// Enabled on `addr`.
    pub fn enabled(addr: SocketAddr) -> Self {
        Self {
            enabled: true,
            addr,
        }
    }
}
