//! # xds-core
//!
//! Core types, traits, and error handling for the xDS control plane.
//!
//! This crate provides the foundational types used across all other xDS crates:
//!
//! - [`XdsError`] - Error taxonomy with gRPC status code mapping
//! - [`NodeId`] - Identifier of a logical proxy group
//! - [`ResourceKind`] - The discoverable resource kinds and their type URLs
//! - [`ResourceVersion`] - Store-issued version numbers
//! - [`Resource`] - Trait implemented by every xDS resource type
//! - [`resources`] - Typed Cluster, Listener, RouteConfiguration,
//!   ClusterLoadAssignment and Secret resources
//! - [`association`] - Resolution of configuration objects to node sets
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xds_core::resources::Cluster;
//! use xds_core::{NodeId, ResourceKind, StoredResource};
//!
//! let node = NodeId::new("fleet-a");
//! let stored = StoredResource::prepare(
//!     ResourceKind::Cluster,
//!     "svc-1",
//!     Arc::new(Cluster::eds("svc-1")),
//! )
//! .unwrap();
//!
//! assert_eq!(node.as_str(), "fleet-a");
//! assert_eq!(stored.name(), "svc-1");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod association;
mod error;
mod kind;
mod node;
mod resource;
pub mod resources;
mod version;

pub use error::XdsError;
pub use kind::ResourceKind;
pub use node::NodeId;
pub use resource::{AnyResource, BoxResource, Resource, StoredResource};
pub use version::ResourceVersion;

/// Result type alias using [`XdsError`].
pub type Result<T> = std::result::Result<T, XdsError>;

/// Alias for Result to maintain backward compatibility.
pub type XdsResult<T> = Result<T>;
