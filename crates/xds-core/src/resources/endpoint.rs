use std::any::Any;

use serde::{Deserialize, Serialize};
use xds_types::envoy::config::core::v3::Locality;
use xds_types::envoy::config::endpoint::v3 as wire;

use super::{encode_proto, json_view, EncodeResult, SocketAddress};
use crate::{Resource, ResourceKind};

/// Endpoints sharing a locality.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalityLbEndpoints {
    /// Locality zone, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    /// Endpoint addresses.
    #[serde(default)]
    pub lb_endpoints: Vec<SocketAddress>,
}

/// Endpoints of one cluster (EDS).
///
/// The resource name is the cluster name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterLoadAssignment {
    /// Cluster the endpoints belong to.
    pub cluster_name: String,
    /// Endpoints grouped by locality.
    #[serde(default)]
    pub endpoints: Vec<LocalityLbEndpoints>,
}

impl ClusterLoadAssignment {
    /// A single-locality assignment.
    #[must_use]
    pub fn new(cluster_name: impl Into<String>, endpoints: Vec<SocketAddress>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            endpoints: vec![LocalityLbEndpoints {
                locality: None,
                lb_endpoints: endpoints,
            }],
        }
    }

    /// The Envoy message this assignment encodes to.
    #[must_use]
    pub fn to_proto(&self) -> wire::ClusterLoadAssignment {
        wire::ClusterLoadAssignment {
            cluster_name: self.cluster_name.clone(),
            endpoints: self
                .endpoints
                .iter()
                .map(|group| wire::LocalityLbEndpoints {
                    locality: group.locality.as_ref().map(|zone| Locality {
                        zone: zone.clone(),
                        ..Default::default()
                    }),
                    lb_endpoints: group
                        .lb_endpoints
                        .iter()
                        .map(|address| wire::LbEndpoint {
                            endpoint: Some(wire::Endpoint {
                                address: Some(address.to_proto()),
                            }),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl Resource for ClusterLoadAssignment {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Endpoint
    }

    fn name(&self) -> &str {
        &self.cluster_name
    }

    fn encode(&self) -> EncodeResult {
        encode_proto(self.kind(), &self.to_proto())
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        json_view(self)
    }

    fn validate(&self) -> Result<(), String> {
        if self.cluster_name.is_empty() {
            return Err("cluster_name is required".to_string());
        }
        for endpoint in self.endpoints.iter().flat_map(|l| &l.lb_endpoints) {
            endpoint.validate()?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_cluster_name() {
        let cla = ClusterLoadAssignment::new("svc-1", vec![SocketAddress::new("10.0.0.1", 8080)]);
        assert_eq!(cla.name(), "svc-1");
        assert!(cla.validate().is_ok());
    }

    #[test]
    fn test_proto_endpoints() {
        let mut cla = ClusterLoadAssignment::new(
            "svc-1",
            vec![SocketAddress::new("10.0.0.1", 8080), SocketAddress::new("10.0.0.2", 8080)],
        );
        cla.endpoints[0].locality = Some("eu-west-1a".to_string());

        let proto = cla.to_proto();
        let group = &proto.endpoints[0];
        assert_eq!(group.locality.as_ref().unwrap().zone, "eu-west-1a");
        assert_eq!(group.lb_endpoints.len(), 2);
        let socket = group.lb_endpoints[1]
            .endpoint
            .as_ref()
            .and_then(|e| e.address.as_ref())
            .and_then(|a| a.socket_address.as_ref())
            .unwrap();
        assert_eq!(socket.address, "10.0.0.2");
        assert_eq!(socket.port_value, Some(8080));
    }

    #[test]
    fn test_missing_cluster_name() {
        let cla = ClusterLoadAssignment::default();
        assert!(cla.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint() {
        let cla = ClusterLoadAssignment::new("svc-1", vec![SocketAddress::new("", 80)]);
        assert!(cla.validate().is_err());
    }
}
