//! Association resolution: which nodes an object's resources belong to.
//!
//! Reconciliation loops record every configuration object they see in a
//! [`ReferenceGraph`], together with the node bindings declared on the
//! object and the objects it references. Before writing an object's
//! resources to the cache they call [`ReferenceGraph::resolve_nodes`] to get
//! the target node set.
//!
//! Resolution rules:
//!
//! - An object with an explicit node binding resolves to exactly that set.
//! - An object without one inherits the union of the nodes of every object
//!   that references it, so a cluster referenced by two listeners on
//!   different nodes is written to both.
//! - An object nothing references and that has no binding resolves to the
//!   graph's default node set (empty unless configured).
//! - An object with a reference to something not in the graph resolves to
//!   the empty set until the dependency appears.
//! - A cycle in the referrer walk is an error.
//!
//! The graph is plain data; it performs no I/O and never touches the cache.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::{NodeId, XdsError, XdsResult};

/// Kind of a user-authored configuration object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// Virtual service: listener plus routes for a host.
    VirtualService,
    /// Listener.
    Listener,
    /// Route.
    Route,
    /// Cluster.
    Cluster,
    /// Endpoint set.
    Endpoint,
    /// TLS secret.
    Secret,
    /// HTTP filter fragment.
    HttpFilter,
    /// Access log configuration fragment.
    AccessLogConfig,
}

impl ObjectKind {
    /// Name of the kind as written by users.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualService => "VirtualService",
            Self::Listener => "Listener",
            Self::Route => "Route",
            Self::Cluster => "Cluster",
            Self::Endpoint => "Endpoint",
            Self::Secret => "Secret",
            Self::HttpFilter => "HttpFilter",
            Self::AccessLogConfig => "AccessLogConfig",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a configuration object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    /// Object kind.
    pub kind: ObjectKind,
    /// Namespace the object lives in.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ObjectRef {
    /// Create an object reference.
    #[must_use]
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Name under which the object's resource is stored in the cache.
    ///
    /// ```rust
    /// use xds_core::association::{ObjectKind, ObjectRef};
    ///
    /// let obj = ObjectRef::new(ObjectKind::Cluster, "default", "backend");
    /// assert_eq!(obj.resource_name(), "default-backend");
    /// ```
    #[must_use]
    pub fn resource_name(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Default)]
struct ObjectEntry {
    nodes: Option<BTreeSet<NodeId>>,
    references: Vec<ObjectRef>,
}

/// Reference graph of configuration objects.
///
/// # Example
///
/// ```rust
/// use xds_core::association::{ObjectKind, ObjectRef, ReferenceGraph};
/// use xds_core::NodeId;
///
/// let listener = ObjectRef::new(ObjectKind::Listener, "default", "ingress");
/// let cluster = ObjectRef::new(ObjectKind::Cluster, "default", "backend");
///
/// let mut graph = ReferenceGraph::new();
/// graph.insert(cluster.clone(), None, vec![]);
/// graph.insert(listener, Some([NodeId::new("fleet-a")].into()), vec![cluster.clone()]);
///
/// let nodes = graph.resolve_nodes(&cluster).unwrap();
/// assert!(nodes.contains("fleet-a"));
/// ```
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    objects: HashMap<ObjectRef, ObjectEntry>,
    referrers: HashMap<ObjectRef, BTreeSet<ObjectRef>>,
    default_nodes: BTreeSet<NodeId>,
}

impl ReferenceGraph {
    /// Create an empty graph with no default nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node set used for unbound, unreferenced objects.
    #[must_use]
    pub fn with_default_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.set_default_nodes(nodes);
        self
    }

    /// Replace the default node set.
    pub fn set_default_nodes(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.default_nodes = nodes.into_iter().collect();
    }

    /// Insert or replace an object.
    ///
    /// `nodes` is the explicit node binding declared on the object, if any.
    /// References may point at objects not yet inserted.
    pub fn insert(
        &mut self,
        object: ObjectRef,
        nodes: Option<BTreeSet<NodeId>>,
        references: Vec<ObjectRef>,
    ) {
        self.unlink(&object);
        for target in &references {
            self.referrers
                .entry(target.clone())
                .or_default()
                .insert(object.clone());
        }
        self.objects.insert(object, ObjectEntry { nodes, references });
    }

    /// Remove an object. Returns `true` if it was present.
    ///
    /// Objects still referencing it keep the reference and become dangling.
    pub fn remove(&mut self, object: &ObjectRef) -> bool {
        self.unlink(object);
        self.objects.remove(object).is_some()
    }

    fn unlink(&mut self, object: &ObjectRef) {
        let Some(entry) = self.objects.get(object) else {
            return;
        };
        for target in &entry.references {
            if let Some(set) = self.referrers.get_mut(target) {
                set.remove(object);
                if set.is_empty() {
                    self.referrers.remove(target);
                }
            }
        }
    }

    /// Check whether an object is in the graph.
    #[must_use]
    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.objects.contains_key(object)
    }

    /// Objects referencing `object`, in order.
    pub fn referrers(&self, object: &ObjectRef) -> impl Iterator<Item = &ObjectRef> {
        self.referrers.get(object).into_iter().flatten()
    }

    /// Number of objects in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Report the first reference of `object` that points outside the graph.
    ///
    /// # Errors
    ///
    /// Returns [`XdsError::DanglingReference`] naming the missing object.
    pub fn check_references(&self, object: &ObjectRef) -> XdsResult<()> {
        match self.missing_reference(object) {
            Some(missing) => Err(XdsError::DanglingReference {
                object: object.to_string(),
                missing: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn missing_reference(&self, object: &ObjectRef) -> Option<&ObjectRef> {
        self.objects
            .get(object)?
            .references
            .iter()
            .find(|r| !self.objects.contains_key(*r))
    }

    /// Resolve the node set of `object`.
    ///
    /// Unknown objects and objects with dangling references resolve to the
    /// empty set.
    ///
    /// # Errors
    ///
    /// Returns [`XdsError::CyclicReference`] if the referrer walk loops.
    pub fn resolve_nodes(&self, object: &ObjectRef) -> XdsResult<BTreeSet<NodeId>> {
        let mut walk = Walk::default();
        self.resolve(object, &mut walk)
    }

    fn resolve(&self, object: &ObjectRef, walk: &mut Walk) -> XdsResult<BTreeSet<NodeId>> {
        if let Some(nodes) = walk.resolved.get(object) {
            return Ok(nodes.clone());
        }
        if walk.on_path.contains(object) {
            let start = walk.path.iter().position(|o| o == object).unwrap_or(0);
            let mut path: Vec<String> = walk.path[start..].iter().map(ToString::to_string).collect();
            path.push(object.to_string());
            return Err(XdsError::CyclicReference { path });
        }

        let Some(entry) = self.objects.get(object) else {
            return Ok(BTreeSet::new());
        };
        if let Some(missing) = self.missing_reference(object) {
            tracing::debug!(%object, %missing, "dangling reference, resolving to no nodes");
            return Ok(BTreeSet::new());
        }

        let nodes = if let Some(explicit) = &entry.nodes {
            explicit.clone()
        } else if !self.referrers.contains_key(object) {
            self.default_nodes.clone()
        } else {
            walk.on_path.insert(object.clone());
            walk.path.push(object.clone());

            let mut union = BTreeSet::new();
            for referrer in self.referrers(object) {
                union.extend(self.resolve(referrer, walk)?);
            }

            walk.path.pop();
            walk.on_path.remove(object);
            union
        };

        walk.resolved.insert(object.clone(), nodes.clone());
        Ok(nodes)
    }
}

#[derive(Default)]
struct Walk {
    path: Vec<ObjectRef>,
    on_path: HashSet<ObjectRef>,
    resolved: HashMap<ObjectRef, BTreeSet<NodeId>>,
}
