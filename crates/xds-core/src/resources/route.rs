use std::any::Any;

use serde::{Deserialize, Serialize};
use xds_types::envoy::config::route::v3 as wire;

use super::{encode_proto, json_view, EncodeResult};
use crate::{Resource, ResourceKind};

/// A prefix route to a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Path prefix to match.
    pub prefix: String,
    /// Target cluster.
    pub cluster: String,
}

/// A virtual host of a route configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    /// Virtual host name.
    pub name: String,
    /// Domains served by this host.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Routes, matched in order.
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// Route configuration (RDS).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfiguration {
    /// Route configuration name.
    pub name: String,
    /// Virtual hosts.
    #[serde(default)]
    pub virtual_hosts: Vec<VirtualHost>,
}

impl RouteConfiguration {
    /// A route configuration sending every request for `domain` to `cluster`.
    #[must_use]
    pub fn single(name: impl Into<String>, domain: &str, cluster: &str) -> Self {
        Self {
            name: name.into(),
            virtual_hosts: vec![VirtualHost {
                name: domain.to_string(),
                domains: vec![domain.to_string()],
                routes: vec![Route {
                    prefix: "/".to_string(),
                    cluster: cluster.to_string(),
                }],
            }],
        }
    }

    /// The Envoy message this configuration encodes to.
    #[must_use]
    pub fn to_proto(&self) -> wire::RouteConfiguration {
        wire::RouteConfiguration {
            name: self.name.clone(),
            virtual_hosts: self
                .virtual_hosts
                .iter()
                .map(|host| wire::VirtualHost {
                    name: host.name.clone(),
                    domains: host.domains.clone(),
                    routes: host
                        .routes
                        .iter()
                        .map(|route| wire::Route {
                            r#match: Some(wire::RouteMatch {
                                prefix: Some(route.prefix.clone()),
                            }),
                            route: Some(wire::RouteAction {
                                cluster: Some(route.cluster.clone()),
                            }),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl Resource for RouteConfiguration {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RouteConfiguration
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> EncodeResult {
        encode_proto(self.kind(), &self.to_proto())
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        json_view(self)
    }

    fn validate(&self) -> Result<(), String> {
        for host in &self.virtual_hosts {
            if host.domains.is_empty() {
                return Err(format!("virtual host {} has no domains", host.name));
            }
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
    fn test_single_route() {
        let rc = RouteConfiguration::single("ingress-routes", "example.com", "svc-1");
        assert!(rc.validate().is_ok());
        assert_eq!(rc.virtual_hosts[0].routes[0].cluster, "svc-1");
    }

    #[test]
    fn test_proto_routes() {
        let proto = RouteConfiguration::single("ingress-routes", "example.com", "svc-1").to_proto();
        let route = &proto.virtual_hosts[0].routes[0];
        assert_eq!(route.r#match.as_ref().unwrap().prefix.as_deref(), Some("/"));
        assert_eq!(route.route.as_ref().unwrap().cluster.as_deref(), Some("svc-1"));
    }

    #[test]
    fn test_virtual_host_without_domains() {
        let mut rc = RouteConfiguration::single("r", "example.com", "svc-1");
        rc.virtual_hosts[0].domains.clear();
        assert!(rc.validate().is_err());
    }
}
