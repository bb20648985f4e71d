//! Node identification for xDS.
//!
//! A node names a logical group of proxy instances that share one
//! configuration snapshot. [`NodeId`] is only ever used as a key: the cache
//! stores resources per node, and proxies present the same identifier in
//! the `node.id` field of their discovery requests.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a logical proxy group.
///
/// Cloning is cheap: the identifier is reference counted, so keys can be
/// copied into cache shards, watch tables and snapshots freely.
///
/// # Example
///
/// ```rust
/// use xds_core::NodeId;
///
/// let a = NodeId::new("fleet-a");
/// let b: NodeId = "fleet-a".into();
///
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "fleet-a");
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Create a node identifier.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the identifier is empty.
    ///
    /// Proxies that omit `node.id` produce an empty identifier, which the
    /// discovery server refuses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", &*self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn node_id_equality() {
        let a = NodeId::new("fleet-a");
        let b = NodeId::from(String::from("fleet-a"));
        let c = NodeId::new("fleet-b");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn node_id_ordering() {
        let set: BTreeSet<NodeId> = ["b", "a", "c"].into_iter().map(NodeId::from).collect();
        let ordered: Vec<&str> = set.iter().map(NodeId::as_str).collect();
        assert_eq!(ordered, vec!["a", "b", "c"]);
    }

    #[test]
    fn node_id_display() {
        let node = NodeId::new("edge-proxy");
        assert_eq!(format!("{node}"), "edge-proxy");
        assert_eq!(format!("{node:?}"), "NodeId(\"edge-proxy\")");
    }

    #[test]
    fn node_id_empty() {
        assert!(NodeId::new("").is_empty());
        assert!(!NodeId::new("n").is_empty());
    }

    #[test]
    fn node_id_serde() {
        let node = NodeId::new("fleet-a");
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "\"fleet-a\"");

        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
