//! # xds-controlplane
//!
//! xDS control plane: a versioned resource store, per-node snapshots and a
//! discovery server for Envoy-compatible proxies.
//!
//! This crate re-exports the stack and ships the `xds-controlplane` binary.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xds_controlplane::prelude::*;
//! use xds_controlplane::core::resources::Cluster;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(ShardedCache::new());
//! cache.update(
//!     &NodeId::new("fleet-a"),
//!     ResourceKind::Cluster,
//!     "svc-1",
//!     Arc::new(Cluster::eds("svc-1")),
//! )?;
//!
//! let server = XdsServer::builder()
//!     .cache(cache)
//!     .enable_sotw()
//!     .enable_delta()
//!     .build()?;
//! server.serve("[::]:18000".parse()?).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - `xds-core` - Node ids, kinds, versions, typed resources, association
//! - `xds-cache` - Resource store, snapshots and watches
//! - `xds-server` - Discovery sessions, ADS service and debug API
//! - `xds-types` - Wire messages
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - All errors are returned as `Result`
//! 2. **No locks held across await points** - Uses DashMap and careful design
//! 3. **Every wakeup rebuilds from the store** - Notifications carry no payload
//! 4. **Observable** - Built-in metrics and tracing support

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;

pub use xds_cache as cache;
pub use xds_core as core;
pub use xds_server as server;
pub use xds_types as types;

use tracing::{debug, info};
use xds_cache::{Cache, ShardedCache};

use crate::config::{ConfigError, SeedResource};

/// Prelude module for convenient imports.
///
/// ```rust
/// use xds_controlplane::prelude::*;
/// ```
pub mod prelude {
    pub use xds_core::association::{ObjectKind, ObjectRef, ReferenceGraph};
    pub use xds_core::{
        BoxResource, NodeId, Resource, ResourceKind, ResourceVersion, StoredResource, XdsError,
        XdsResult,
    };

    pub use xds_cache::{Cache, CacheStats, ShardedCache, Snapshot, SnapshotBuilder, Watch, WatchId};

    pub use xds_server::{ServerConfig, StreamContext, StreamId, XdsServer, XdsServerBuilder};
}

/// Write configured seed resources to the store.
///
/// Returns the number of resources written.
///
/// # Errors
///
/// Stops at the first entry that cannot be built or that the store rejects.
pub fn seed_cache(cache: &ShardedCache, resources: &[SeedResource]) -> Result<usize, ConfigError> {
    for seed in resources {
        let (node, kind, resource) = seed.to_resource()?;
        let version = cache
            .update(&node, kind, &seed.name, resource)
            .map_err(|e| ConfigError::Seed {
                node: seed.node.clone(),
                kind: seed.kind.clone(),
                name: seed.name.clone(),
                message: e.to_string(),
            })?;
        debug!(node = %node, kind = %kind, name = %seed.name, version = %version, "seeded resource");
    }

    if !resources.is_empty() {
        info!(count = resources.len(), nodes = cache.nodes().len(), "seeded store");
    }
    Ok(resources.len())
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("xds-controlplane {} (MSRV {})", VERSION, MSRV)
    }
}
