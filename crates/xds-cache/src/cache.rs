//! Cache trait and ShardedCache implementation.
//!
//! The cache stores resources keyed by `(node, kind, name)`. The
//! [`ShardedCache`] implementation keeps one `DashMap` entry per
//! `(node, kind)` group, so writers to different groups never contend and
//! writers to the same group serialize on the entry.
//!
//! ## Versions
//!
//! Every accepted write takes the next value of a store-wide sequence and
//! stamps it on the group it changed. Versions therefore strictly increase
//! per group and are never reused, even when a group is emptied and written
//! again. Each store draws its own epoch and stamps it on every version, so
//! a store rebuilt after a restart never hands out a version a proxy may
//! still hold from the previous one.
//!
//! ## Consistent snapshots
//!
//! Each node has a clock made of a generation and an in-flight writer
//! count. A writer registers itself, mutates the group, advances the
//! generation to its sequence number and deregisters. [`Cache::build`]
//! reads the clock before and after reading every group and retries until
//! no writer was in flight and the generation did not move. The snapshot
//! version is that generation, so two builds without an intervening write
//! return the same version and the same content.
//!
//! A build spins for a bounded number of retries, then parks on the clock
//! until the last writer leaves. Writers hold the clock only for a map
//! insert, but a parked build does block its thread, including a runtime
//! worker.
//!
//! ## Pruning
//!
//! Emptied groups stay behind as tombstones so watchers see the empty set
//! at a new version. Once every group of a node is empty and nothing
//! watches the node, its groups and clock are dropped and the node reads
//! as never written.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, trace, warn};
use xds_core::{
    BoxResource, NodeId, ResourceKind, ResourceVersion, StoredResource, XdsResult,
};

use crate::snapshot::Snapshot;
use crate::stats::CacheStats;
use crate::watch::{Watch, WatchId, WatchManager};

/// Build retries spent spinning before parking on the clock.
const SPIN_RETRIES: u64 = 64;

/// Longest single park of a build waiting for writers.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Trait for xDS resource stores.
///
/// Provides the write and read interface used by reconciliation loops, the
/// discovery server and the debug API.
pub trait Cache: Send + Sync {
    /// Insert or replace a resource.
    ///
    /// Always advances the kind version, even if the content is unchanged.
    /// Returns the new kind version.
    ///
    /// # Errors
    ///
    /// Returns [`XdsError::InvalidResource`](xds_core::XdsError::InvalidResource)
    /// if the resource does not match `kind` and `name`, fails validation, or
    /// cannot be encoded. The store is unchanged in that case.
    fn update(
        &self,
        node: &NodeId,
        kind: ResourceKind,
        name: &str,
        resource: BoxResource,
    ) -> XdsResult<ResourceVersion>;

    /// Delete a resource. Deleting an absent resource is a no-op.
    fn delete(&self, node: &NodeId, kind: ResourceKind, name: &str) -> XdsResult<()>;

    /// Get the resources of a kind for a node, ordered by name.
    fn get(&self, node: &NodeId, kind: ResourceKind) -> Vec<StoredResource>;

    /// Get every node holding at least one resource.
    fn nodes(&self) -> BTreeSet<NodeId>;

    /// Build a consistent snapshot of a node.
    fn build(&self, node: &NodeId) -> Snapshot;

    /// Get the current version of a kind for a node.
    fn version(&self, node: &NodeId, kind: ResourceKind) -> ResourceVersion;
}

#[derive(Debug, Default)]
struct KindEntry {
    version: ResourceVersion,
    resources: Arc<BTreeMap<String, StoredResource>>,
}

#[derive(Debug, Default)]
struct NodeClock {
    generation: AtomicU64,
    writers: AtomicU64,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl NodeClock {
    /// Block until no writer is in flight or `timeout` passes.
    fn wait_idle(&self, timeout: Duration) {
        let guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.writers.load(Ordering::SeqCst) != 0 {
            drop(self.idle.wait_timeout(guard, timeout));
        }
    }
}

/// A writer registered on a node clock.
struct WriteGuard {
    clock: Arc<NodeClock>,
}

impl WriteGuard {
    fn new(clock: Arc<NodeClock>) -> Self {
        clock.writers.fetch_add(1, Ordering::SeqCst);
        Self { clock }
    }

    fn advance(&self, version: ResourceVersion) {
        self.clock
            .generation
            .fetch_max(version.as_u64(), Ordering::SeqCst);
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.clock.writers.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _idle = self
                .clock
                .idle_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.clock.idle.notify_all();
        }
    }
}

/// A sharded in-memory resource store using DashMap.
///
/// This cache implementation:
/// - Uses `DashMap` for fine-grained concurrent access per `(node, kind)`
/// - Shares resource maps with snapshots through copy-on-write `Arc`s
/// - Notifies watches of the changed group after every write
/// - Tracks statistics for monitoring
///
/// ## Important
///
/// No `DashMap` reference outlives a method call, and none is held while
/// notifying watches.
#[derive(Debug)]
pub struct ShardedCache {
    /// Resources per `(node, kind)`.
    entries: DashMap<(NodeId, ResourceKind), KindEntry>,
    /// Per-node write clocks.
    clocks: DashMap<NodeId, Arc<NodeClock>>,
    /// Store-wide version sequence.
    sequence: AtomicU64,
    /// Epoch stamped on every version this store issues.
    epoch: u64,
    /// Watch manager for notifications.
    watches: WatchManager,
    /// Statistics.
    stats: CacheStats,
}

impl Default for ShardedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedCache {
    /// Create a new sharded cache with default settings.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new sharded cache with a specific initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        CacheBuilder::new().capacity(capacity).build()
    }

    /// Get the watch manager.
    #[inline]
    pub fn watches(&self) -> &WatchManager {
        &self.watches
    }

    /// Get cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the epoch stamped on this store's versions.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Create a watch for a `(node, kind)` group.
    ///
    /// The watch receives a notification after every write to the group.
    /// Callers should build a snapshot after creating the watch to pick up
    /// the current state.
    #[inline]
    pub fn create_watch(&self, node: NodeId, kind: ResourceKind) -> Watch {
        self.watches.create_watch(node, kind)
    }

    /// Cancel a watch.
    ///
    /// Prunes the node if this was its last watch and it holds no resources.
    pub fn cancel_watch(&self, watch_id: WatchId) {
        if let Some(node) = self.watches.cancel_watch(watch_id) {
            self.prune(&node);
        }
    }

    /// Check whether a node has any resources.
    pub fn has_node(&self, node: &NodeId) -> bool {
        ResourceKind::ALL.into_iter().any(|kind| {
            self.entries
                .get(&(node.clone(), kind))
                .is_some_and(|e| !e.resources.is_empty())
        })
    }

    /// Drop the groups and clock of a node with no resources and no watches.
    ///
    /// Returns `true` if the node was pruned. Later writes still draw from
    /// the store-wide sequence, so no version handed out before is reused.
    pub fn prune(&self, node: &NodeId) -> bool {
        if self.has_node(node) || self.watches.has_watches(node) {
            return false;
        }

        // New writers register under the clock map lock held here, so a
        // clock with no writers stays that way until it is removed.
        let pruned = self
            .clocks
            .remove_if(node, |_, clock| {
                if clock.writers.load(Ordering::SeqCst) != 0 {
                    return false;
                }
                let _writer = WriteGuard::new(Arc::clone(clock));
                if self.has_node(node) {
                    return false;
                }
                for kind in ResourceKind::ALL {
                    self.entries.remove(&(node.clone(), kind));
                }
                true
            })
            .is_some();

        if pruned {
            debug!(node = %node, "pruned empty node");
        }
        pruned
    }

    fn stamp(&self, sequence: u64) -> ResourceVersion {
        if sequence == 0 {
            ResourceVersion::ZERO
        } else {
            ResourceVersion::with_epoch(self.epoch, sequence)
        }
    }

    fn next_version(&self) -> ResourceVersion {
        self.stamp(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Register a writer on the node clock, creating the clock if needed.
    fn writer(&self, node: &NodeId) -> WriteGuard {
        if let Some(writer) = self.existing_writer(node) {
            return writer;
        }
        let clock = self.clocks.entry(node.clone()).or_default();
        WriteGuard::new(Arc::clone(&clock))
    }

    /// Register a writer on the node clock if the node has one.
    fn existing_writer(&self, node: &NodeId) -> Option<WriteGuard> {
        let clock = self.clocks.get(node)?;
        Some(WriteGuard::new(Arc::clone(&clock)))
    }

    fn notify(&self, node: &NodeId, kind: ResourceKind, version: ResourceVersion) {
        let delivered = self.watches.notify(node, kind, version);
        self.stats.record_notifications(delivered);
    }
}

impl Cache for ShardedCache {
    fn update(
        &self,
        node: &NodeId,
        kind: ResourceKind,
        name: &str,
        resource: BoxResource,
    ) -> XdsResult<ResourceVersion> {
        let stored = match StoredResource::prepare(kind, name, resource) {
            Ok(stored) => stored,
            Err(e) => {
                self.stats.record_rejected();
                warn!(node = %node, kind = %kind, name, error = %e, "rejected resource");
                return Err(e);
            }
        };

        let version = {
            let writer = self.writer(node);
            let mut entry = self.entries.entry((node.clone(), kind)).or_default();
            Arc::make_mut(&mut entry.resources).insert(name.to_string(), stored);
            let version = self.next_version();
            entry.version = version;
            writer.advance(version);
            version
        };

        self.stats.record_update();
        debug!(node = %node, kind = %kind, name, version = %version, "updated resource");
        self.notify(node, kind, version);
        Ok(version)
    }

    fn delete(&self, node: &NodeId, kind: ResourceKind, name: &str) -> XdsResult<()> {
        let Some(writer) = self.existing_writer(node) else {
            trace!(node = %node, kind = %kind, name, "delete of unknown node ignored");
            return Ok(());
        };

        let (version, emptied) = {
            let writer = writer;
            let Some(mut entry) = self.entries.get_mut(&(node.clone(), kind)) else {
                return Ok(());
            };
            if !entry.resources.contains_key(name) {
                return Ok(());
            }
            Arc::make_mut(&mut entry.resources).remove(name);
            let version = self.next_version();
            entry.version = version;
            writer.advance(version);
            (version, entry.resources.is_empty())
        };

        self.stats.record_delete();
        debug!(node = %node, kind = %kind, name, version = %version, "deleted resource");
        self.notify(node, kind, version);
        if emptied {
            self.prune(node);
        }
        Ok(())
    }

    fn get(&self, node: &NodeId, kind: ResourceKind) -> Vec<StoredResource> {
        self.entries
            .get(&(node.clone(), kind))
            .map(|e| e.resources.values().cloned().collect())
            .unwrap_or_default()
    }

    fn nodes(&self) -> BTreeSet<NodeId> {
        self.entries
            .iter()
            .filter(|e| !e.resources.is_empty())
            .map(|e| e.key().0.clone())
            .collect()
    }

    fn build(&self, node: &NodeId) -> Snapshot {
        let Some(clock) = self.clocks.get(node).map(|c| Arc::clone(&c)) else {
            self.stats.record_build(0);
            return Snapshot::empty(node.clone());
        };

        let mut retries = 0u64;
        loop {
            let generation = clock.generation.load(Ordering::SeqCst);
            if clock.writers.load(Ordering::SeqCst) == 0 {
                let mut builder = Snapshot::builder(node.clone()).version(self.stamp(generation));
                for kind in ResourceKind::ALL {
                    if let Some(entry) = self.entries.get(&(node.clone(), kind)) {
                        builder = builder.shared(kind, entry.version, Arc::clone(&entry.resources));
                    }
                }

                if clock.writers.load(Ordering::SeqCst) == 0
                    && clock.generation.load(Ordering::SeqCst) == generation
                {
                    self.stats.record_build(retries);
                    let snapshot = builder.build();
                    trace!(
                        node = %node,
                        version = %snapshot.version(),
                        resources = snapshot.total_resources(),
                        retries,
                        "built snapshot"
                    );
                    return snapshot;
                }
            }

            retries += 1;
            if retries <= SPIN_RETRIES {
                std::hint::spin_loop();
            } else {
                clock.wait_idle(IDLE_WAIT);
            }
        }
    }

    fn version(&self, node: &NodeId, kind: ResourceKind) -> ResourceVersion {
        self.entries
            .get(&(node.clone(), kind))
            .map(|e| e.version)
            .unwrap_or_default()
    }
}

/// Builder for creating a configured cache.
#[derive(Debug, Default)]
pub struct CacheBuilder {
    capacity: Option<usize>,
    watch_buffer_size: Option<usize>,
}

impl CacheBuilder {
    /// Create a new cache builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial capacity in `(node, kind)` groups.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the watch channel buffer size.
    pub fn watch_buffer_size(mut self, size: usize) -> Self {
        self.watch_buffer_size = Some(size);
        self
    }

    /// Build the cache.
    pub fn build(self) -> ShardedCache {
        let capacity = self.capacity.unwrap_or(64);
        let watch_buffer = self.watch_buffer_size.unwrap_or(16);

        ShardedCache {
            entries: DashMap::with_capacity(capacity),
            clocks: DashMap::with_capacity(capacity / ResourceKind::ALL.len() + 1),
            sequence: AtomicU64::new(0),
            epoch: ResourceVersion::fresh_epoch(),
            watches: WatchManager::with_buffer_size(watch_buffer),
            stats: CacheStats::new(),
        }
    }
}
