//! Integration tests for the xDS control plane.
//!
//! The test modules exercise the crates together: the store and snapshot
//! builder under concurrency, association resolution feeding the store, and
//! full discovery streams over a real gRPC connection.
//!
//! Run with: `cargo test --package xds-integration-tests`

#![deny(unsafe_code)]

use std::sync::Arc;

use xds_controlplane::core::resources::{
    Cluster, ClusterLoadAssignment, Listener, RouteConfiguration, SocketAddress,
};
use xds_controlplane::core::BoxResource;

#[cfg(test)]
mod association_tests;
#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod load_tests;
#[cfg(test)]
mod protocol_tests;
#[cfg(test)]
mod snapshot_tests;

/// An EDS cluster.
pub fn cluster(name: &str) -> BoxResource {
    Arc::new(Cluster::eds(name))
}

/// An EDS cluster whose content differs by `timeout_ms`.
pub fn cluster_with_timeout(name: &str, timeout_ms: u64) -> BoxResource {
    let mut cluster = Cluster::eds(name);
    cluster.connect_timeout_ms = Some(timeout_ms);
    Arc::new(cluster)
}

/// A load assignment with one endpoint per port.
pub fn endpoints(cluster: &str, ports: &[u16]) -> BoxResource {
    Arc::new(ClusterLoadAssignment::new(
        cluster,
        ports
            .iter()
            .map(|port| SocketAddress::new("10.0.0.1", *port))
            .collect(),
    ))
}

/// An HTTP listener on `port` routing through `route`.
pub fn listener(name: &str, port: u16, route: &str) -> BoxResource {
    Arc::new(Listener::http(name, SocketAddress::new("0.0.0.0", port), route))
}

/// A route configuration sending everything for `domain` to `cluster`.
pub fn route(name: &str, domain: &str, cluster: &str) -> BoxResource {
    Arc::new(RouteConfiguration::single(name, domain, cluster))
}
