//! # xds-server
//!
//! xDS gRPC server implementation for control planes.
//!
//! This crate provides the protocol layer on top of `xds-cache`:
//!
//! - [`XdsServer`] - Main server type serving the Aggregated Discovery Service
//! - [`XdsServerBuilder`] - Builder for configuring the server
//! - [`session`] - Per-kind state-of-the-world session state machine
//! - [`delta`] - Incremental (delta) sessions
//! - [`debug`] - Read-only HTTP view of the store
//! - Metrics through the `metrics` facade
//! - Graceful shutdown with stream draining
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xds_cache::ShardedCache;
//! use xds_server::XdsServerBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(ShardedCache::new());
//! let server = XdsServerBuilder::new()
//!     .cache(cache)
//!     .enable_sotw()
//!     .enable_delta()
//!     .build()?;
//!
//! // Drains streams on SIGTERM/SIGINT.
//! server.serve("[::]:18000".parse()?).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How a stream works
//!
//! The first request on a stream names the node. Each requested kind gets a
//! session and a cache watch for `(node, kind)`. Whenever the store changes,
//! or the client answers a push, the session rebuilds a snapshot and decides
//! whether to push. Closing the stream cancels all of its watches.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
pub mod debug;
pub mod delta;
pub mod metrics;
pub mod session;
pub mod shutdown;
pub mod sotw;
mod stream;


pub mod services;

pub use builder::XdsServerBuilder;
pub use config::{DebugApiConfig, ServerConfig};
pub use metrics::XdsMetrics;
pub use shutdown::ShutdownController;
pub use stream::{generate_nonce, NoncePrefix, StreamContext, StreamId};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::Server;
use tracing::{error, info};
use xds_cache::ShardedCache;
use xds_core::{XdsError, XdsResult};

use crate::services::{AdsService, AggregatedDiscoveryServiceServer};

/// The main xDS server.
///
/// Serves the Aggregated Discovery Service from a shared cache, and the
/// debug API when configured.
#[derive(Debug)]
pub struct XdsServer {
    cache: Arc<ShardedCache>,
    config: Arc<ServerConfig>,
    metrics: XdsMetrics,
    shutdown: ShutdownController,
}

impl XdsServer {
    /// Create a new builder for configuring the server.
    pub fn builder() -> XdsServerBuilder {
        XdsServerBuilder::new()
    }

    /// Get a reference to the cache.
    #[inline]
    pub fn cache(&self) -> &Arc<ShardedCache> {
        &self.cache
    }

    /// Get the server configuration.
    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the metrics handle.
    #[inline]
    pub fn metrics(&self) -> &XdsMetrics {
        &self.metrics
    }

    /// Get the shutdown controller.
    #[inline]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// The ADS service bound to this server's cache and configuration.
    pub fn ads_service(&self) -> AdsService {
        AdsService::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.config),
            self.metrics.clone(),
            self.shutdown.clone(),
        )
    }

    fn build_router(&self) -> tonic::transport::server::Router {
        let mut builder = Server::builder();

        if let Some(interval) = self.config.keepalive_interval {
            builder = builder.http2_keepalive_interval(Some(interval));
        }
        if let Some(timeout) = self.config.keepalive_timeout {
            builder = builder.http2_keepalive_timeout(Some(timeout));
        }
        if let Some(max_streams) = self.config.max_concurrent_streams {
            builder = builder.concurrency_limit_per_connection(max_streams as usize);
        }

        let ads: AggregatedDiscoveryServiceServer<AdsService> = self.ads_service().into_service();
        builder.add_service(ads)
    }

    /// Start the server and listen on the given address.
    ///
    /// Shuts down gracefully on SIGTERM/SIGINT.
    pub async fn serve(self, addr: SocketAddr) -> XdsResult<()> {
        self.serve_with_shutdown(addr, shutdown::wait_for_signal())
            .await
    }

    /// Start the server with a custom shutdown signal.
    ///
    /// When `signal` resolves, open streams are told to end and the server
    /// waits up to the configured grace period for them before stopping.
    pub async fn serve_with_shutdown<F>(self, addr: SocketAddr, signal: F) -> XdsResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %addr, sotw = self.config.enable_sotw, delta = self.config.enable_delta, "starting xDS server");

        let debug_api = if self.config.debug_api.enabled {
            let listener = tokio::net::TcpListener::bind(self.config.debug_api.addr)
                .await
                .map_err(|e| XdsError::transport("failed to bind debug API", e))?;
            let cache = Arc::clone(&self.cache);
            let stop = self.shutdown.shutdown_signal().wait();
            Some(tokio::spawn(debug::serve(listener, cache, stop)))
        } else {
            None
        };

        let router = self.build_router();
        let controller = self.shutdown.clone();
        let grace_period = self.config.grace_period;

        info!(addr = %addr, "xDS server listening");
        let result = router
            .serve_with_shutdown(addr, async move {
                signal.await;
                info!(grace_period = ?grace_period, "draining streams");
                controller.shutdown(grace_period).await;
            })
            .await
            .map_err(|e| XdsError::transport("xDS server failed", e));

        // Stop the debug API even if the gRPC server failed on its own.
        self.shutdown.shutdown(std::time::Duration::ZERO).await;
        if let Some(handle) = debug_api {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "debug API failed"),
                Err(e) => error!(error = %e, "debug API task failed"),
            }
        }

        info!("xDS server stopped");
        result
    }
}
