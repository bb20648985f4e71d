//! Association resolution feeding the store.
//!
//! These tests play the part of a reconciliation loop: record objects in a
//! [`ReferenceGraph`], resolve each one to its node set and write the
//! resulting resources.

use std::collections::BTreeSet;

use xds_controlplane::prelude::*;

use crate::{cluster, listener};

fn nodes(ids: &[&str]) -> BTreeSet<NodeId> {
    ids.iter().map(|id| NodeId::new(*id)).collect()
}

/// Write `object`'s resource to every node it resolves to.
fn reconcile(cache: &ShardedCache, graph: &ReferenceGraph, object: &ObjectRef) -> XdsResult<usize> {
    let targets = graph.resolve_nodes(object)?;
    let name = object.resource_name();
    for node in &targets {
        let (kind, resource) = match object.kind {
            ObjectKind::Listener => (ResourceKind::Listener, listener(&name, 8080, "routes")),
            ObjectKind::Cluster => (ResourceKind::Cluster, cluster(&name)),
            other => panic!("no fixture for {other}"),
        };
        cache.update(node, kind, &name, resource)?;
    }
    Ok(targets.len())
}

#[test]
fn shared_cluster_reaches_every_referring_node() {
    let cache = ShardedCache::new();
    let backend = ObjectRef::new(ObjectKind::Cluster, "default", "backend");
    let east = ObjectRef::new(ObjectKind::Listener, "default", "east");
    let west = ObjectRef::new(ObjectKind::Listener, "default", "west");

    let mut graph = ReferenceGraph::new();
    graph.insert(backend.clone(), None, vec![]);
    graph.insert(east.clone(), Some(nodes(&["fleet-a"])), vec![backend.clone()]);
    graph.insert(west.clone(), Some(nodes(&["fleet-b"])), vec![backend.clone()]);

    for object in [&east, &west, &backend] {
        reconcile(&cache, &graph, object).unwrap();
    }

    for node in ["fleet-a", "fleet-b"] {
        let snapshot = cache.build(&NodeId::new(node));
        let clusters = snapshot.get_resources(ResourceKind::Cluster).unwrap();
        assert!(clusters.get("default-backend").is_some(), "{node} is missing the cluster");
        assert_eq!(snapshot.get_resources(ResourceKind::Listener).unwrap().len(), 1);
    }
}

#[test]
fn explicit_binding_wins_over_referrers() {
    let backend = ObjectRef::new(ObjectKind::Cluster, "default", "backend");
    let front = ObjectRef::new(ObjectKind::Listener, "default", "front");

    let mut graph = ReferenceGraph::new();
    graph.insert(backend.clone(), Some(nodes(&["fleet-c"])), vec![]);
    graph.insert(front, Some(nodes(&["fleet-a"])), vec![backend.clone()]);

    assert_eq!(graph.resolve_nodes(&backend).unwrap(), nodes(&["fleet-c"]));
}

#[test]
fn dangling_reference_resolves_once_dependency_appears() {
    let cache = ShardedCache::new();
    let backend = ObjectRef::new(ObjectKind::Cluster, "default", "backend");
    let front = ObjectRef::new(ObjectKind::Listener, "default", "front");

    let mut graph = ReferenceGraph::new();
    graph.insert(front.clone(), Some(nodes(&["fleet-a"])), vec![backend.clone()]);

    assert!(matches!(
        graph.check_references(&front),
        Err(XdsError::DanglingReference { .. })
    ));
    assert_eq!(reconcile(&cache, &graph, &front).unwrap(), 0);
    assert!(cache.nodes().is_empty());

    graph.insert(backend.clone(), None, vec![]);
    graph.check_references(&front).unwrap();
    assert_eq!(reconcile(&cache, &graph, &front).unwrap(), 1);
    assert_eq!(reconcile(&cache, &graph, &backend).unwrap(), 1);
    assert_eq!(cache.build(&NodeId::new("fleet-a")).total_resources(), 2);
}

#[test]
fn cycle_is_reported() {
    let a = ObjectRef::new(ObjectKind::Route, "default", "a");
    let b = ObjectRef::new(ObjectKind::Route, "default", "b");

    let mut graph = ReferenceGraph::new();
    graph.insert(a.clone(), None, vec![b.clone()]);
    graph.insert(b.clone(), None, vec![a.clone()]);

    match graph.resolve_nodes(&a) {
        Err(XdsError::CyclicReference { path }) => {
            assert!(path.len() >= 2);
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn unreferenced_object_uses_default_nodes() {
    let orphan = ObjectRef::new(ObjectKind::Cluster, "default", "orphan");

    let mut graph = ReferenceGraph::new();
    graph.insert(orphan.clone(), None, vec![]);
    assert!(graph.resolve_nodes(&orphan).unwrap().is_empty());

    graph.set_default_nodes(nodes(&["fleet-a", "fleet-b"]));
    assert_eq!(graph.resolve_nodes(&orphan).unwrap(), nodes(&["fleet-a", "fleet-b"]));
}

#[test]
fn removing_a_referrer_shrinks_the_node_set() {
    let cache = ShardedCache::new();
    let backend = ObjectRef::new(ObjectKind::Cluster, "default", "backend");
    let east = ObjectRef::new(ObjectKind::Listener, "default", "east");
    let west = ObjectRef::new(ObjectKind::Listener, "default", "west");

    let mut graph = ReferenceGraph::new();
    graph.insert(backend.clone(), None, vec![]);
    graph.insert(east, Some(nodes(&["fleet-a"])), vec![backend.clone()]);
    graph.insert(west.clone(), Some(nodes(&["fleet-b"])), vec![backend.clone()]);
    assert_eq!(reconcile(&cache, &graph, &backend).unwrap(), 2);

    assert!(graph.remove(&west));
    let before = graph.resolve_nodes(&backend).unwrap();
    assert_eq!(before, nodes(&["fleet-a"]));

    // The loop deletes from nodes that dropped out.
    let name = backend.resource_name();
    for node in nodes(&["fleet-a", "fleet-b"]).difference(&before) {
        cache.delete(node, ResourceKind::Cluster, &name).unwrap();
    }
    assert_eq!(cache.nodes(), nodes(&["fleet-a"]));
}
