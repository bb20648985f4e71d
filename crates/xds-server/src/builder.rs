//! Server builder for configuring and creating the xDS server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use xds_cache::ShardedCache;
use xds_core::{XdsError, XdsResult};

use crate::config::{DebugApiConfig, ServerConfig};
use crate::metrics::XdsMetrics;
use crate::shutdown::ShutdownController;
use crate::XdsServer;

/// Builder for creating an [`XdsServer`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use xds_cache::ShardedCache;
/// use xds_server::XdsServerBuilder;
///
/// let cache = Arc::new(ShardedCache::new());
/// let server = XdsServerBuilder::new()
///     .cache(cache)
///     .enable_sotw()
///     .enable_delta()
///     .max_concurrent_streams(200)
///     .build()
///     .unwrap();
/// assert!(server.config().enable_delta);
/// ```
#[derive(Debug, Default)]
pub struct XdsServerBuilder {
    cache: Option<Arc<ShardedCache>>,
    config: ServerConfig,
    metrics: Option<XdsMetrics>,
}

impl XdsServerBuilder {
    /// Create a new server builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Set the cache to use.
    ///
    /// This is required.
    pub fn cache(mut self, cache: Arc<ShardedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a metrics handle instead of creating one.
    pub fn metrics(mut self, metrics: XdsMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enable State-of-the-World protocol.
    pub fn enable_sotw(mut self) -> Self {
        self.config.enable_sotw = true;
        self
    }

    /// Disable State-of-the-World protocol.
    pub fn disable_sotw(mut self) -> Self {
        self.config.enable_sotw = false;
        self
    }

    /// Enable Delta xDS protocol.
    pub fn enable_delta(mut self) -> Self {
        self.config.enable_delta = true;
        self
    }

    /// Disable Delta xDS protocol.
    pub fn disable_delta(mut self) -> Self {
        self.config.enable_delta = false;
        self
    }

    /// Set maximum concurrent streams per connection.
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.max_concurrent_streams = Some(max);
        self
    }

    /// Set keepalive interval and timeout.
    pub fn keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.keepalive_interval = Some(interval);
        self.config.keepalive_timeout = Some(timeout);
        self
    }

    /// Set maximum decoded request size.
    pub fn max_request_size(mut self, size: usize) -> Self {
        self.config.max_request_size = size;
        self
    }

    /// Set the per-stream response buffer.
    pub fn response_buffer_size(mut self, size: usize) -> Self {
        self.config.response_buffer_size = size;
        self
    }

    /// Set how long shutdown waits for open streams.
    pub fn graceful_shutdown(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Refuse streams from nodes with no resources. On by default.
    pub fn require_known_node(mut self, require: bool) -> Self {
        self.config.require_known_node = require;
        self
    }

    /// Identify responses with a control plane id.
    pub fn control_plane_id(mut self, id: impl Into<String>) -> Self {
        self.config.control_plane_id = Some(id.into());
        self
    }

    /// Serve the debug API on `addr`.
    pub fn debug_api(mut self, addr: SocketAddr) -> Self {
        self.config.debug_api = DebugApiConfig::enabled(addr);
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No cache was provided
    /// - Neither SotW nor Delta is enabled
    /// - The response buffer or request size is zero
    pub fn build(self) -> XdsResult<XdsServer> {
        let cache = self
            .cache
            .ok_or_else(|| XdsError::Configuration("cache is required".into()))?;

        if !self.config.enable_sotw && !self.config.enable_delta {
            return Err(XdsError::Configuration(
                "at least one protocol (SotW or Delta) must be enabled".into(),
            ));
        }
        if self.config.response_buffer_size == 0 {
            return Err(XdsError::Configuration(
                "response buffer size must be positive".into(),
            ));
        }
        if self.config.max_request_size == 0 {
            return Err(XdsError::Configuration(
                "max request size must be positive".into(),
            ));
        }

        Ok(XdsServer {
            cache,
            config: Arc::new(self.config),
            metrics: self.metrics.unwrap_or_default(),
            shutdown: ShutdownController::new(),
        })
    }
}
