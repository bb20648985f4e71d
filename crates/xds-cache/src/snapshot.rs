//! Snapshot: immutable, versioned view of one node's resources.
//!
//! A snapshot represents a consistent view of all resources for a node
//! at a specific version. Snapshots are:
//!
//! - **Immutable**: Once created, a snapshot cannot be modified
//! - **Versioned**: The snapshot version is the node's generation, and each
//!   kind carries its own version
//! - **Kind-organized**: Resources are grouped by kind and ordered by name
//!
//! Resource maps are shared with the store through `Arc`, so building a
//! snapshot copies no resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use xds_core::{NodeId, ResourceKind, ResourceVersion, StoredResource};

/// Resources of one kind within a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotResources {
    /// Version of this kind.
    version: ResourceVersion,
    /// Resources keyed and ordered by name.
    resources: Arc<BTreeMap<String, StoredResource>>,
}

impl SnapshotResources {
    pub(crate) fn shared(
        version: ResourceVersion,
        resources: Arc<BTreeMap<String, StoredResource>>,
    ) -> Self {
        Self { version, resources }
    }

    /// Get the version of this kind.
    #[inline]
    pub fn version(&self) -> ResourceVersion {
        self.version
    }

    /// Get the number of resources.
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if there are no resources.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Get a resource by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&StoredResource> {
        self.resources.get(name)
    }

    /// Iterate over resources in name order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &StoredResource> {
        self.resources.values()
    }

    /// Get all resource names in order.
    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Resources matching `names`, in name order. An empty list selects
    /// everything.
    pub fn select<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a StoredResource> {
        self.resources
            .values()
            .filter(move |r| names.is_empty() || names.iter().any(|n| n == r.name()))
    }

    /// Get all resources as a vec, in name order.
    pub fn to_vec(&self) -> Vec<StoredResource> {
        self.resources.values().cloned().collect()
    }

    fn same_content(&self, other: &Self) -> bool {
        self.version == other.version
            && self.resources.len() == other.resources.len()
            && self
                .resources
                .iter()
                .zip(other.resources.iter())
                .all(|((a, ra), (b, rb))| a == b && ra.fingerprint() == rb.fingerprint())
    }
}

/// An immutable snapshot of xDS resources for a node.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Node the snapshot was built for.
    node: NodeId,
    /// Node generation when the snapshot was read.
    version: ResourceVersion,
    /// Non-empty kinds.
    resources: BTreeMap<ResourceKind, SnapshotResources>,
    /// Version of every kind ever written, including emptied ones.
    versions: BTreeMap<ResourceKind, ResourceVersion>,
    /// Creation timestamp.
    created_at: std::time::Instant,
}

impl Snapshot {
    /// Create a new snapshot builder.
    pub fn builder(node: NodeId) -> SnapshotBuilder {
        SnapshotBuilder::new(node)
    }

    /// An empty snapshot at version zero.
    pub fn empty(node: NodeId) -> Self {
        SnapshotBuilder::new(node).build()
    }

    /// Get the node this snapshot belongs to.
    #[inline]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Get the version of this snapshot.
    #[inline]
    pub fn version(&self) -> ResourceVersion {
        self.version
    }

    /// Get the creation timestamp.
    #[inline]
    pub fn created_at(&self) -> std::time::Instant {
        self.created_at
    }

    /// Get resources for a kind, if the kind has any.
    #[inline]
    pub fn get_resources(&self, kind: ResourceKind) -> Option<&SnapshotResources> {
        self.resources.get(&kind)
    }

    /// Get the version of a kind.
    ///
    /// Kinds whose resources were all deleted keep their last version.
    /// Kinds never written report [`ResourceVersion::ZERO`].
    #[inline]
    pub fn kind_version(&self, kind: ResourceKind) -> ResourceVersion {
        self.versions.get(&kind).copied().unwrap_or_default()
    }

    /// Check if this snapshot contains resources of a kind.
    #[inline]
    pub fn contains_kind(&self, kind: ResourceKind) -> bool {
        self.resources.contains_key(&kind)
    }

    /// Kinds with at least one resource, in order.
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.resources.keys().copied()
    }

    /// Get the total number of resources across all kinds.
    pub fn total_resources(&self) -> usize {
        self.resources.values().map(SnapshotResources::len).sum()
    }

    /// Check if this snapshot is empty (no resources).
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Snapshots compare by node, versions and resource fingerprints.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
            && self.version == other.version
            && self.versions == other.versions
            && self.resources.len() == other.resources.len()
            && self
                .resources
                .iter()
                .zip(other.resources.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.same_content(b))
    }
}

/// Builder for creating snapshots.
#[derive(Debug)]
pub struct SnapshotBuilder {
    node: NodeId,
    version: ResourceVersion,
    resources: BTreeMap<ResourceKind, SnapshotResources>,
    versions: BTreeMap<ResourceKind, ResourceVersion>,
}

impl SnapshotBuilder {
    /// Create a new snapshot builder.
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            version: ResourceVersion::ZERO,
            resources: BTreeMap::new(),
            versions: BTreeMap::new(),
        }
    }

    /// Set the snapshot version.
    pub fn version(mut self, version: ResourceVersion) -> Self {
        self.version = version;
        self
    }

    /// Add resources of a kind at a version.
    ///
    /// An empty resource list records the version only, as for a kind whose
    /// resources were all deleted.
    pub fn resources(
        self,
        kind: ResourceKind,
        version: ResourceVersion,
        resources: impl IntoIterator<Item = StoredResource>,
    ) -> Self {
        let map: BTreeMap<String, StoredResource> = resources
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();
        self.shared(kind, version, Arc::new(map))
    }

    pub(crate) fn shared(
        mut self,
        kind: ResourceKind,
        version: ResourceVersion,
        resources: Arc<BTreeMap<String, StoredResource>>,
    ) -> Self {
        self.versions.insert(kind, version);
        if resources.is_empty() {
            self.resources.remove(&kind);
        } else {
            self.resources
                .insert(kind, SnapshotResources::shared(version, resources));
        }
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> Snapshot {
        Snapshot {
            node: self.node,
            version: self.version,
            resources: self.resources,
            versions: self.versions,
            created_at: std::time::Instant::now(),
        }
    }
}

/// Wrapper around `Arc<Snapshot>` for convenient sharing.
pub type SharedSnapshot = Arc<Snapshot>;
