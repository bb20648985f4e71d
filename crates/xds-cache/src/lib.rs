//! # xds-cache
//!
//! Sharded in-memory resource store for the xDS control plane.
//!
//! This crate provides the storage layer between reconciliation loops and
//! the discovery server:
//!
//! - [`ShardedCache`] - DashMap-based store keyed by `(node, kind, name)`
//! - [`Snapshot`] - Immutable, versioned view of one node's resources
//! - [`Watch`] - Change notifications per `(node, kind)`
//!
//! ## Key Design Decisions
//!
//! - Uses `DashMap` so writers to different `(node, kind)` groups never block
//!   each other
//! - All `DashMap` references are dropped before any `.await` or watch
//!   notification
//! - Resource maps are copy-on-write, so snapshots share them with the store
//! - Watch notifications are non-blocking and carry no resources
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xds_cache::{Cache, ShardedCache};
//! use xds_core::resources::Cluster;
//! use xds_core::{NodeId, ResourceKind};
//!
//! let cache = ShardedCache::new();
//! let node = NodeId::new("fleet-a");
//!
//! let version = cache
//!     .update(&node, ResourceKind::Cluster, "svc-1", Arc::new(Cluster::eds("svc-1")))
//!     .unwrap();
//!
//! let snapshot = cache.build(&node);
//! assert_eq!(snapshot.kind_version(ResourceKind::Cluster), version);
//! assert_eq!(snapshot.total_resources(), 1);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod snapshot;
mod stats;
mod watch;

pub use cache::{Cache, CacheBuilder, ShardedCache};
pub use snapshot::{SharedSnapshot, Snapshot, SnapshotBuilder, SnapshotResources};
pub use stats::CacheStats;
pub use watch::{ChangeNotification, Watch, WatchId, WatchManager};
