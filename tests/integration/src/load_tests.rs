//! Load tests for the store with 1000+ nodes.
//!
//! These tests verify the system can handle high load scenarios:
//! - 1000+ nodes
//! - Parallel writers on a shared store
//! - Watch notification under load
//!
//! Run with: `cargo test --package xds-integration-tests load_tests -- --nocapture`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Barrier;
use xds_controlplane::prelude::*;

use crate::{cluster, listener};

#[tokio::test]
async fn test_1000_nodes() {
    let cache = Arc::new(ShardedCache::new());
    let num_nodes = 1000;

    let nodes: Vec<NodeId> = (0..num_nodes)
        .map(|i| NodeId::new(format!("envoy-sidecar-{i}")))
        .collect();

    let start = Instant::now();
    for node in &nodes {
        cache
            .update(node, ResourceKind::Cluster, "svc", cluster("svc"))
            .unwrap();
        cache
            .update(node, ResourceKind::Listener, "http", listener("http", 8080, "routes"))
            .unwrap();
    }
    let write_duration = start.elapsed();
    println!(
        "Wrote {} resources in {:?} ({:.2} µs/op)",
        num_nodes * 2,
        write_duration,
        write_duration.as_micros() as f64 / (num_nodes * 2) as f64
    );

    let start = Instant::now();
    for node in &nodes {
        assert_eq!(cache.build(node).total_resources(), 2);
    }
    println!("Built {} snapshots in {:?}", num_nodes, start.elapsed());

    let stats = cache.stats();
    assert_eq!(cache.nodes().len(), num_nodes);
    assert_eq!(stats.updates(), (num_nodes * 2) as u64);
    assert_eq!(stats.builds(), num_nodes as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_writers() {
    let cache = Arc::new(ShardedCache::new());
    let num_tasks = 16;
    let nodes_per_task = 100;
    let barrier = Arc::new(Barrier::new(num_tasks));
    let written = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..num_tasks)
        .map(|task| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let written = Arc::clone(&written);
            tokio::spawn(async move {
                barrier.wait().await;
                for i in 0..nodes_per_task {
                    // Every task also writes to one shared node.
                    let nodes = [
                        NodeId::new(format!("task-{task}-node-{i}")),
                        NodeId::new("shared"),
                    ];
                    for node in &nodes {
                        let name = format!("svc-{task}-{i}");
                        cache
                            .update(node, ResourceKind::Cluster, &name, cluster(&name))
                            .unwrap();
                        written.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let expected = (num_tasks * nodes_per_task) as u64;
    assert_eq!(written.load(Ordering::Relaxed), expected * 2);
    assert_eq!(cache.nodes().len(), num_tasks * nodes_per_task + 1);

    let shared = cache.build(&NodeId::new("shared"));
    assert_eq!(shared.total_resources() as u64, expected);
    assert_eq!(shared.version(), cache.version(&NodeId::new("shared"), ResourceKind::Cluster));
}

#[tokio::test]
async fn test_watch_fanout_under_load() {
    let cache = Arc::new(ShardedCache::new());
    let node = NodeId::new("fleet-a");
    let num_watches = 500;

    let mut watches: Vec<Watch> = (0..num_watches)
        .map(|_| cache.create_watch(node.clone(), ResourceKind::Cluster))
        .collect();
    assert_eq!(cache.watches().watch_count(&node, ResourceKind::Cluster), num_watches);

    let start = Instant::now();
    let version = cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    println!("Notified {} watches in {:?}", num_watches, start.elapsed());

    for watch in &mut watches {
        let notification = tokio::time::timeout(Duration::from_secs(1), watch.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.version, version);
    }
    assert_eq!(cache.stats().notifications_sent(), num_watches as u64);

    for watch in &watches {
        cache.cancel_watch(watch.id());
    }
    assert_eq!(cache.watches().total_watch_count(), 0);
}

/// A watcher that never drains still lets writers proceed.
#[tokio::test]
async fn test_slow_watcher_does_not_block_writes() {
    let cache = Arc::new(ShardedCache::new());
    let node = NodeId::new("fleet-a");
    let mut watch = cache.create_watch(node.clone(), ResourceKind::Cluster);

    let mut last = ResourceVersion::ZERO;
    for i in 0..1000 {
        let name = format!("svc-{i}");
        last = cache
            .update(&node, ResourceKind::Cluster, &name, cluster(&name))
            .unwrap();
    }

    // At least one wakeup is queued; the rest may have been dropped.
    let first = watch.try_recv().unwrap();
    assert!(first.version <= last);
    assert_eq!(cache.build(&node).total_resources(), 1000);
}
