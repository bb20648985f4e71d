//! Resource kinds served over xDS.
//!
//! Each [`ResourceKind`] maps to one Envoy v3 type URL. Proxies subscribe per
//! type URL, the cache groups resources per kind, and the debug API accepts
//! the short or plural form in request paths.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::XdsError;

/// Kind of a discoverable xDS resource.
///
/// HTTP filters and access log configurations are not listed here: they
/// travel inside listener filter chains and are never requested on their
/// own.
///
/// # Example
///
/// ```rust
/// use xds_core::ResourceKind;
///
/// let kind = ResourceKind::from_type_url("type.googleapis.com/envoy.config.cluster.v3.Cluster");
/// assert_eq!(kind, Some(ResourceKind::Cluster));
///
/// let kind: ResourceKind = "routes".parse().unwrap();
/// assert_eq!(kind.short_name(), "RouteConfiguration");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Upstream cluster (CDS).
    Cluster,
    /// Listener (LDS).
    Listener,
    /// Route configuration (RDS).
    RouteConfiguration,
    /// Cluster load assignment (EDS).
    Endpoint,
    /// TLS secret (SDS).
    Secret,
}

impl ResourceKind {
    /// Type URL for Cluster (CDS).
    pub const CLUSTER_TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.cluster.v3.Cluster";

    /// Type URL for Listener (LDS).
    pub const LISTENER_TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.listener.v3.Listener";

    /// Type URL for RouteConfiguration (RDS).
    pub const ROUTE_TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

    /// Type URL for ClusterLoadAssignment (EDS).
    pub const ENDPOINT_TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

    /// Type URL for Secret (SDS).
    pub const SECRET_TYPE_URL: &'static str =
        "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";

    /// All kinds, in the order Envoy prefers to receive them.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Cluster,
        ResourceKind::Endpoint,
        ResourceKind::Listener,
        ResourceKind::RouteConfiguration,
        ResourceKind::Secret,
    ];

    /// Get the type URL for this kind.
    #[must_use]
    pub const fn type_url(&self) -> &'static str {
        match self {
            Self::Cluster => Self::CLUSTER_TYPE_URL,
            Self::Listener => Self::LISTENER_TYPE_URL,
            Self::RouteConfiguration => Self::ROUTE_TYPE_URL,
            Self::Endpoint => Self::ENDPOINT_TYPE_URL,
            Self::Secret => Self::SECRET_TYPE_URL,
        }
    }

    /// Short name, i.e. the last segment of the type URL.
    #[must_use]
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::Cluster => "Cluster",
            Self::Listener => "Listener",
            Self::RouteConfiguration => "RouteConfiguration",
            Self::Endpoint => "ClusterLoadAssignment",
            Self::Secret => "Secret",
        }
    }

    /// Plural lowercase name used in HTTP paths.
    #[must_use]
    pub const fn plural(&self) -> &'static str {
        match self {
            Self::Cluster => "clusters",
            Self::Listener => "listeners",
            Self::RouteConfiguration => "routes",
            Self::Endpoint => "endpoints",
            Self::Secret => "secrets",
        }
    }

    /// Look up a kind by its exact type URL.
    #[must_use]
    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_url() == type_url)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for ResourceKind {
    type Err = XdsError;

    /// Accepts a type URL, a short name (case-insensitive) or a plural path
    /// segment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(kind) = Self::from_type_url(s) {
            return Ok(kind);
        }
        Self::ALL
            .into_iter()
            .find(|k| k.short_name().eq_ignore_ascii_case(s) || k.plural() == s)
            .or(match s {
                "route" | "endpoint" => Self::ALL.into_iter().find(|k| k.plural().starts_with(s)),
                _ => None,
            })
            .ok_or_else(|| XdsError::UnknownKind {
                type_url: s.to_string(),
            })
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_url_lookup() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_type_url(kind.type_url()), Some(kind));
        }
        assert_eq!(
            ResourceKind::from_type_url("type.googleapis.com/envoy.service.runtime.v3.Runtime"),
            None
        );
    }

    #[test]
    fn test_short_name() {
        assert_eq!(ResourceKind::Cluster.short_name(), "Cluster");
        assert_eq!(ResourceKind::Endpoint.short_name(), "ClusterLoadAssignment");
        assert!(ResourceKind::Endpoint
            .type_url()
            .ends_with(ResourceKind::Endpoint.short_name()));
    }

    #[test]
    fn test_parse() {
        assert_eq!("clusters".parse::<ResourceKind>().unwrap(), ResourceKind::Cluster);
        assert_eq!("listener".parse::<ResourceKind>().unwrap(), ResourceKind::Listener);
        assert_eq!(
            "RouteConfiguration".parse::<ResourceKind>().unwrap(),
            ResourceKind::RouteConfiguration
        );
        assert_eq!("route".parse::<ResourceKind>().unwrap(), ResourceKind::RouteConfiguration);
        assert_eq!("endpoints".parse::<ResourceKind>().unwrap(), ResourceKind::Endpoint);
        assert_eq!(
            ResourceKind::SECRET_TYPE_URL.parse::<ResourceKind>().unwrap(),
            ResourceKind::Secret
        );
    }

    #[test]
    fn test_parse_unknown() {
        let err = "runtimes".parse::<ResourceKind>().unwrap_err();
        assert!(matches!(err, XdsError::UnknownKind { .. }));
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&ResourceKind::Endpoint).unwrap();
        assert_eq!(json, "\"ClusterLoadAssignment\"");
    }
}
