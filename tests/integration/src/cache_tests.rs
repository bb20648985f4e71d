//! Store integration tests.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use xds_controlplane::cache::ChangeNotification;
use xds_controlplane::prelude::*;

use crate::{cluster, cluster_with_timeout, endpoints, listener};

fn fleet_a() -> NodeId {
    NodeId::new("fleet-a")
}

/// The canonical walk: write, rewrite with identical bytes, delete.
#[test]
fn fleet_a_svc_1_lifecycle() {
    let cache = ShardedCache::new();
    let node = fleet_a();
    // A watched node keeps its emptied groups.
    let _watch = cache.create_watch(node.clone(), ResourceKind::Cluster);

    let v1 = cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    let first = cache.build(&node);
    assert_eq!(first.kind_version(ResourceKind::Cluster), v1);
    let bytes = first
        .get_resources(ResourceKind::Cluster)
        .and_then(|r| r.get("svc-1"))
        .map(|r| r.encoded().value.clone())
        .unwrap();

    // Identical content still advances the version.
    let v2 = cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    assert!(v2 > v1);
    let second = cache.build(&node);
    assert!(second.version() > first.version());
    let same = second
        .get_resources(ResourceKind::Cluster)
        .and_then(|r| r.get("svc-1"))
        .unwrap();
    assert_eq!(same.encoded().value, bytes);

    cache.delete(&node, ResourceKind::Cluster, "svc-1").unwrap();
    let third = cache.build(&node);
    assert!(third.get_resources(ResourceKind::Cluster).is_none());
    assert!(!third.contains_kind(ResourceKind::Cluster));
    assert!(third.kind_version(ResourceKind::Cluster) > v2);
    assert!(cache.get(&node, ResourceKind::Cluster).is_empty());
}

/// An emptied node nobody watches reads as never written.
#[test]
fn unwatched_empty_node_is_pruned() {
    let cache = ShardedCache::new();
    let node = fleet_a();
    let v1 = cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    cache.delete(&node, ResourceKind::Cluster, "svc-1").unwrap();

    assert!(cache.nodes().is_empty());
    assert_eq!(cache.build(&node).version(), ResourceVersion::ZERO);

    let v2 = cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    assert!(v2 > v1);
}

#[test]
fn update_then_get_is_byte_identical() {
    let cache = ShardedCache::new();
    let node = fleet_a();
    let resource = endpoints("svc-1", &[8080, 8081]);
    let expected = resource.encode().unwrap();

    cache
        .update(&node, ResourceKind::Endpoint, "svc-1", resource)
        .unwrap();

    let stored = cache.get(&node, ResourceKind::Endpoint);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].encoded(), &expected);
}

#[test]
fn nodes_are_isolated() {
    let cache = ShardedCache::new();
    let a = NodeId::new("fleet-a");
    let b = NodeId::new("fleet-b");

    cache
        .update(&a, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    cache
        .update(&b, ResourceKind::Cluster, "svc-2", cluster("svc-2"))
        .unwrap();
    cache.delete(&a, ResourceKind::Cluster, "svc-2").unwrap();

    assert_eq!(cache.get(&a, ResourceKind::Cluster)[0].name(), "svc-1");
    assert_eq!(cache.get(&b, ResourceKind::Cluster)[0].name(), "svc-2");
    assert_eq!(cache.nodes().len(), 2);
}

#[test]
fn invalid_resource_leaves_store_unchanged() {
    let cache = ShardedCache::new();
    let node = fleet_a();
    cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    let before = cache.build(&node);

    // Name does not match the resource.
    let err = cache
        .update(&node, ResourceKind::Cluster, "svc-2", cluster("svc-1"))
        .unwrap_err();
    assert!(matches!(err, XdsError::InvalidResource { .. }));

    // Kind does not match the resource.
    let err = cache
        .update(&node, ResourceKind::Listener, "svc-1", cluster("svc-1"))
        .unwrap_err();
    assert!(matches!(err, XdsError::InvalidResource { .. }));

    assert_eq!(cache.build(&node), before);
    assert_eq!(cache.stats().rejected_writes(), 2);
}

#[test]
fn concurrent_updates_to_different_kinds_are_both_visible() {
    let cache = Arc::new(ShardedCache::new());
    let node = fleet_a();

    let writers: Vec<_> = [ResourceKind::Cluster, ResourceKind::Listener]
        .into_iter()
        .map(|kind| {
            let cache = Arc::clone(&cache);
            let node = node.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let name = format!("{}-{i}", kind.plural());
                    let resource = match kind {
                        ResourceKind::Cluster => cluster(&name),
                        _ => listener(&name, 10000 + i as u16, "routes"),
                    };
                    cache.update(&node, kind, &name, resource).unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    let snapshot = cache.build(&node);
    assert_eq!(snapshot.get_resources(ResourceKind::Cluster).unwrap().len(), 200);
    assert_eq!(snapshot.get_resources(ResourceKind::Listener).unwrap().len(), 200);
    assert_eq!(
        snapshot.version(),
        std::cmp::max(
            snapshot.kind_version(ResourceKind::Cluster),
            snapshot.kind_version(ResourceKind::Listener)
        )
    );
}

#[tokio::test]
async fn watch_sees_every_kind_write() {
    let cache = ShardedCache::new();
    let node = fleet_a();
    let mut watch = cache.create_watch(node.clone(), ResourceKind::Cluster);
    let mut other = cache.create_watch(node.clone(), ResourceKind::Listener);

    let version = cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster_with_timeout("svc-1", 100))
        .unwrap();

    let notification = tokio::time::timeout(Duration::from_secs(1), watch.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        notification,
        ChangeNotification {
            node: node.clone(),
            kind: ResourceKind::Cluster,
            version,
        }
    );
    assert!(other.try_recv().is_err());

    cache.cancel_watch(watch.id());
    cache.cancel_watch(other.id());
    assert_eq!(cache.watches().total_watch_count(), 0);
}

proptest! {
    /// The last write to a name is the one the store returns.
    #[test]
    fn last_writer_wins(timeouts in prop::collection::vec(1u64..10_000, 1..20)) {
        let cache = ShardedCache::new();
        let node = fleet_a();
        let mut last = ResourceVersion::ZERO;

        for timeout in &timeouts {
            let version = cache
                .update(&node, ResourceKind::Cluster, "svc-1", cluster_with_timeout("svc-1", *timeout))
                .unwrap();
            prop_assert!(version > last);
            last = version;
        }

        let expected = cluster_with_timeout("svc-1", *timeouts.last().unwrap())
            .encode()
            .unwrap();
        let stored = cache.get(&node, ResourceKind::Cluster);
        prop_assert_eq!(stored.len(), 1);
        prop_assert_eq!(stored[0].encoded(), &expected);
        prop_assert_eq!(cache.version(&node, ResourceKind::Cluster), last);
    }

    /// Any mix of writes and deletes leaves exactly the surviving names.
    #[test]
    fn writes_and_deletes_match_a_model(ops in prop::collection::vec((0u8..5, any::<bool>()), 1..40)) {
        let cache = ShardedCache::new();
        let node = fleet_a();
        let mut model = std::collections::BTreeSet::new();

        for (id, write) in ops {
            let name = format!("svc-{id}");
            if write {
                cache.update(&node, ResourceKind::Cluster, &name, cluster(&name)).unwrap();
                model.insert(name);
            } else {
                cache.delete(&node, ResourceKind::Cluster, &name).unwrap();
                model.remove(&name);
            }
        }

        let names: Vec<String> = cache
            .get(&node, ResourceKind::Cluster)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        prop_assert_eq!(names, model.into_iter().collect::<Vec<_>>());
    }
}
