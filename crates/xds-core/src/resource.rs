//! Resource trait and stored resource representation.
//!
//! This module provides the [`Resource`] trait implemented by every typed
//! xDS resource, [`AnyResource`] for pre-encoded payloads, and
//! [`StoredResource`], the validated and encoded form the cache keeps.

use std::any::Any;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use fnv::FnvHasher;

use crate::{ResourceKind, XdsError};

/// Trait for xDS resources.
///
/// Implement this trait to create resource types that can be stored in the
/// cache and served via xDS.
///
/// # Example
///
/// ```rust
/// use xds_core::{Resource, ResourceKind};
/// use prost_types::Any;
/// use std::any::Any as StdAny;
///
/// #[derive(Debug)]
/// struct MyCluster {
///     name: String,
/// }
///
/// impl Resource for MyCluster {
///     fn kind(&self) -> ResourceKind {
///         ResourceKind::Cluster
///     }
///
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn encode(&self) -> Result<Any, Box<dyn std::error::Error + Send + Sync>> {
///         Ok(Any {
///             type_url: self.type_url().to_string(),
///             value: self.name.as_bytes().to_vec(),
///         })
///     }
///
///     fn as_any(&self) -> &dyn StdAny {
///         self
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Get the kind of this resource.
    fn kind(&self) -> ResourceKind;

    /// Get the resource name.
    fn name(&self) -> &str;

    /// Encode the resource to a protobuf Any message.
    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>>;

    /// Check kind-specific required fields.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// JSON view for inspection. `None` for opaque payloads.
    fn to_json(&self) -> Option<serde_json::Value> {
        None
    }

    /// Get the type URL for this resource.
    fn type_url(&self) -> &'static str {
        self.kind().type_url()
    }

    /// Convert to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Type alias for a shared resource.
/// Uses Arc so stored resources are shared between the store and snapshots.
pub type BoxResource = Arc<dyn Resource>;

/// A pre-encoded protobuf Any message that implements Resource.
///
/// Useful when resources are produced elsewhere and only need to be
/// stored and served without decoding.
#[derive(Debug, Clone)]
pub struct AnyResource {
    kind: ResourceKind,
    name: String,
    any: prost_types::Any,
}

impl AnyResource {
    /// Create a new AnyResource.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            kind,
            name: name.into(),
            any: prost_types::Any {
                type_url: kind.type_url().to_string(),
                value,
            },
        }
    }

    /// Get the inner Any message.
    #[must_use]
    pub fn inner(&self) -> &prost_types::Any {
        &self.any
    }
}

impl Resource for AnyResource {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.any.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A validated resource together with its encoded bytes.
///
/// The fingerprint is a 64-bit FNV-1a hash of the encoded bytes. Two
/// resources with identical bytes share a fingerprint, which the delta
/// protocol uses as the per-resource version.
#[derive(Clone)]
pub struct StoredResource {
    resource: BoxResource,
    encoded: Arc<prost_types::Any>,
    fingerprint: u64,
}

impl StoredResource {
    /// Validate and encode `resource` for storage under `(kind, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`XdsError::InvalidResource`] if the resource kind or name
    /// does not match the key, if kind-specific validation fails, or if the
    /// resource cannot be encoded.
    pub fn prepare(kind: ResourceKind, name: &str, resource: BoxResource) -> Result<Self, XdsError> {
        let invalid = |reason: String| XdsError::invalid_resource(kind.type_url(), name, reason);

        if resource.kind() != kind {
            return Err(invalid(format!(
                "resource is a {}, not a {}",
                resource.kind(),
                kind
            )));
        }
        if name.is_empty() {
            return Err(invalid("resource name cannot be empty".to_string()));
        }
        if resource.name() != name {
            return Err(invalid(format!(
                "resource is named {:?}, stored as {:?}",
                resource.name(),
                name
            )));
        }
        resource.validate().map_err(invalid)?;

        let encoded = resource
            .encode()
            .map_err(|e| invalid(format!("encoding failed: {e}")))?;
        if encoded.type_url != kind.type_url() {
            return Err(invalid(format!(
                "encoded with type URL {:?}",
                encoded.type_url
            )));
        }

        Ok(Self {
            fingerprint: fingerprint(&encoded.value),
            encoded: Arc::new(encoded),
            resource,
        })
    }

    /// Get the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.resource.name()
    }

    /// Get the resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// Get the typed resource.
    #[must_use]
    pub fn resource(&self) -> &BoxResource {
        &self.resource
    }

    /// Get the encoded form.
    #[must_use]
    pub fn encoded(&self) -> &prost_types::Any {
        &self.encoded
    }

    /// Get the content fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// The fingerprint as sent in delta `Resource.version`.
    #[must_use]
    pub fn version_string(&self) -> String {
        format!("{:016x}", self.fingerprint)
    }
}

impl fmt::Debug for StoredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredResource")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .finish()
    }
}

fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}
