//! Error types for xDS operations.
//!
//! This module provides [`XdsError`], the error type shared by the cache,
//! the association resolver and the discovery server. Every variant maps to
//! a gRPC status code so protocol failures can be returned to proxies
//! directly.

/// Error type for xDS operations.
///
/// - Store writes fail synchronously with [`XdsError::InvalidResource`] and
///   leave the store unchanged.
/// - Association failures are [`XdsError::CyclicReference`] and
///   [`XdsError::DanglingReference`].
/// - Protocol failures ([`XdsError::UnknownNode`], [`XdsError::StaleAck`],
///   [`XdsError::Rejected`]) stay inside the discovery server.
///
/// # Example
///
/// ```rust
/// use xds_core::XdsError;
///
/// fn validate_name(name: &str) -> Result<(), XdsError> {
///     if name.is_empty() {
///         return Err(XdsError::InvalidResource {
///             type_url: "type.googleapis.com/envoy.config.cluster.v3.Cluster".to_string(),
///             name: name.to_string(),
///             reason: "resource name cannot be empty".to_string(),
///         });
///     }
///     Ok(())
/// }
///
/// assert!(validate_name("").is_err());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum XdsError {
    /// Resource failed validation or could not be encoded.
    #[error("invalid resource {type_url}/{name}: {reason}")]
    InvalidResource {
        /// The type URL of the resource.
        type_url: String,
        /// The name of the resource.
        name: String,
        /// Reason for validation failure.
        reason: String,
    },

    /// Resolving an object's nodes walked back into itself.
    #[error("cyclic reference: {}", path.join(" -> "))]
    CyclicReference {
        /// Objects visited, ending with the repeated one.
        path: Vec<String>,
    },

    /// An object references something that does not exist.
    #[error("dangling reference from {object} to {missing}")]
    DanglingReference {
        /// The referencing object.
        object: String,
        /// The missing referenced object.
        missing: String,
    },

    /// A discovery request carried no usable node identity.
    #[error("unknown node: {node_id:?}")]
    UnknownNode {
        /// The node identifier received, possibly empty.
        node_id: String,
    },

    /// Type URL or kind name not served by this control plane.
    #[error("unknown resource kind: {type_url}")]
    UnknownKind {
        /// The unrecognized type URL or name.
        type_url: String,
    },

    /// Acknowledgement for a nonce that is no longer outstanding.
    #[error("stale ack for {type_url}: nonce {nonce}")]
    StaleAck {
        /// The type URL of the acknowledged kind.
        type_url: String,
        /// The nonce carried by the acknowledgement.
        nonce: String,
    },

    /// Proxy rejected a pushed configuration (NACK).
    #[error("{node_id} rejected {type_url} version {version} (nonce {nonce}): {reason}")]
    Rejected {
        /// The node that sent the NACK.
        node_id: String,
        /// The type URL that was rejected.
        type_url: String,
        /// The rejected version.
        version: String,
        /// The nonce of the rejected response.
        nonce: String,
        /// Error message from the proxy.
        reason: String,
    },

    /// Protobuf encoding failed.
    #[error("encoding error for {type_url}: {message}")]
    EncodingError {
        /// The type URL being encoded.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// Decoding a resource body failed.
    #[error("decoding error for {type_url}: {message}")]
    DecodingError {
        /// The type URL being decoded.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// gRPC or HTTP transport error.
    #[error("transport error: {message}")]
    TransportError {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Client stream closed unexpectedly.
    #[error("stream closed: {reason}")]
    StreamClosed {
        /// Reason for stream closure.
        reason: String,
    },

    /// Server is shutting down.
    #[error("server is shutting down")]
    Shutdown,

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Watch subscription was closed.
    #[error("watch closed: watch_id={watch_id}")]
    WatchClosed {
        /// ID of the closed watch.
        watch_id: u64,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl XdsError {
    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error from any error type.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TransportError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an [`XdsError::InvalidResource`].
    pub fn invalid_resource(
        type_url: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidResource {
            type_url: type_url.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Convert to tonic::Status for gRPC responses.
impl From<XdsError> for tonic::Status {
    fn from(err: XdsError) -> Self {
        match &err {
            XdsError::InvalidResource { .. }
            | XdsError::UnknownNode { .. }
            | XdsError::UnknownKind { .. }
            | XdsError::EncodingError { .. }
            | XdsError::DecodingError { .. }
            | XdsError::Configuration(_) => tonic::Status::invalid_argument(err.to_string()),
            XdsError::CyclicReference { .. } | XdsError::DanglingReference { .. } => {
                tonic::Status::failed_precondition(err.to_string())
            }
            XdsError::StaleAck { .. } => tonic::Status::aborted(err.to_string()),
            XdsError::Rejected { .. } => tonic::Status::failed_precondition(err.to_string()),
            XdsError::TransportError { .. } | XdsError::StreamClosed { .. } | XdsError::Shutdown => {
                tonic::Status::unavailable(err.to_string())
            }
            XdsError::Internal { .. } => tonic::Status::internal(err.to_string()),
            XdsError::WatchClosed { .. } => tonic::Status::cancelled(err.to_string()),
        }
    }
}
