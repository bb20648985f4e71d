//! Snapshot builder integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use xds_controlplane::prelude::*;

use crate::{cluster, cluster_with_timeout, endpoints, listener, route};

fn populate(cache: &ShardedCache, node: &NodeId) {
    cache
        .update(node, ResourceKind::Listener, "ingress", listener("ingress", 8080, "ingress-routes"))
        .unwrap();
    cache
        .update(
            node,
            ResourceKind::RouteConfiguration,
            "ingress-routes",
            route("ingress-routes", "*", "svc-1"),
        )
        .unwrap();
    cache
        .update(node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    cache
        .update(node, ResourceKind::Endpoint, "svc-1", endpoints("svc-1", &[9000]))
        .unwrap();
}

#[test]
fn build_twice_is_identical() {
    let cache = ShardedCache::new();
    let node = NodeId::new("fleet-a");
    populate(&cache, &node);

    let a = cache.build(&node);
    let b = cache.build(&node);
    assert_eq!(a, b);
    assert_eq!(a.version(), b.version());
    assert_eq!(a.total_resources(), 4);
    assert_eq!(
        a.kinds().collect::<Vec<_>>(),
        vec![
            ResourceKind::Cluster,
            ResourceKind::Listener,
            ResourceKind::RouteConfiguration,
            ResourceKind::Endpoint,
        ]
    );
}

#[test]
fn snapshot_is_detached_from_later_writes() {
    let cache = ShardedCache::new();
    let node = NodeId::new("fleet-a");
    populate(&cache, &node);

    let before = cache.build(&node);
    cache
        .update(&node, ResourceKind::Cluster, "svc-2", cluster("svc-2"))
        .unwrap();
    cache.delete(&node, ResourceKind::Endpoint, "svc-1").unwrap();

    assert_eq!(before.get_resources(ResourceKind::Cluster).unwrap().len(), 1);
    assert!(before.get_resources(ResourceKind::Endpoint).is_some());

    let after = cache.build(&node);
    assert_eq!(after.get_resources(ResourceKind::Cluster).unwrap().len(), 2);
    assert!(after.get_resources(ResourceKind::Endpoint).is_none());
    assert!(after.version() > before.version());
}

#[test]
fn version_covers_every_kind() {
    let cache = ShardedCache::new();
    let node = NodeId::new("fleet-a");
    populate(&cache, &node);

    let snapshot = cache.build(&node);
    let max = ResourceKind::ALL
        .iter()
        .map(|k| snapshot.kind_version(*k))
        .max()
        .unwrap();
    assert_eq!(snapshot.version(), max);
    assert!(snapshot.kind_version(ResourceKind::Secret).is_empty());
}

#[test]
fn unknown_node_builds_empty() {
    let cache = ShardedCache::new();
    let snapshot = cache.build(&NodeId::new("nobody"));
    assert!(snapshot.is_empty());
    assert!(snapshot.version().is_empty());
}

/// Builds running alongside writers never see a torn state and never go
/// backwards.
#[test]
fn builds_are_consistent_under_concurrent_writes() {
    let cache = Arc::new(ShardedCache::new());
    let node = NodeId::new("fleet-a");
    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = [ResourceKind::Cluster, ResourceKind::Endpoint]
        .into_iter()
        .map(|kind| {
            let cache = Arc::clone(&cache);
            let node = node.clone();
            std::thread::spawn(move || {
                for i in 0..500u64 {
                    let resource = match kind {
                        ResourceKind::Cluster => cluster_with_timeout("svc-1", i + 1),
                        _ => endpoints("svc-1", &[(9000 + i % 100) as u16]),
                    };
                    cache.update(&node, kind, "svc-1", resource).unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let cache = Arc::clone(&cache);
        let node = node.clone();
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            let mut last = ResourceVersion::ZERO;
            let mut builds = 0u64;
            while !done.load(Ordering::SeqCst) {
                let snapshot = cache.build(&node);
                assert!(snapshot.version() >= last, "snapshot version went backwards");
                for kind in snapshot.kinds() {
                    assert!(snapshot.kind_version(kind) <= snapshot.version());
                    let resources = snapshot.get_resources(kind).unwrap();
                    assert_eq!(resources.version(), snapshot.kind_version(kind));
                }
                last = snapshot.version();
                builds += 1;
            }
            builds
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reader.join().unwrap() > 0);

    let last = cache.build(&node);
    assert_eq!(last.kind_version(ResourceKind::Cluster), cache.version(&node, ResourceKind::Cluster));
    assert_eq!(last.kind_version(ResourceKind::Endpoint), cache.version(&node, ResourceKind::Endpoint));
}

proptest! {
    /// Repeated builds with no writes in between are equal.
    #[test]
    fn build_is_repeatable(names in prop::collection::btree_set("[a-z]{1,8}", 0..10)) {
        let cache = ShardedCache::new();
        let node = NodeId::new("fleet-a");
        for name in &names {
            cache.update(&node, ResourceKind::Cluster, name, cluster(name)).unwrap();
        }

        let a = cache.build(&node);
        let b = cache.build(&node);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.total_resources(), names.len());
    }
}
