use std::any::Any;

use prost::Message;
use serde::{Deserialize, Serialize};
use xds_types::envoy::config::accesslog::v3 as accesslog;
use xds_types::envoy::config::core::v3 as core;
use xds_types::envoy::config::listener::v3 as wire;
use xds_types::envoy::extensions::filters::network::http_connection_manager::v3 as hcm;

use super::{encode_proto, json_view, pack_typed_config, EncodeResult};
use crate::{Resource, ResourceKind};

/// Type URL of the router HTTP filter config.
pub const ROUTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";

/// A TCP socket address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketAddress {
    /// IP address or hostname.
    pub address: String,
    /// Port.
    pub port_value: u16,
}

impl SocketAddress {
    /// Create a socket address.
    #[must_use]
    pub fn new(address: impl Into<String>, port_value: u16) -> Self {
        Self {
            address: address.into(),
            port_value,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.address.is_empty() {
            return Err("socket address is empty".to_string());
        }
        Ok(())
    }

    /// The Envoy address this socket address encodes to.
    #[must_use]
    pub fn to_proto(&self) -> core::Address {
        core::Address {
            socket_address: Some(core::SocketAddress {
                protocol: core::SocketProtocol::Tcp as i32,
                address: self.address.clone(),
                port_value: Some(u32::from(self.port_value)),
            }),
        }
    }
}

/// An HTTP filter embedded in a filter chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpFilter {
    /// Filter name, e.g. `envoy.filters.http.router`.
    pub name: String,
    /// Filter configuration. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_config: Option<serde_json::Value>,
}

/// An access log configuration embedded in a filter chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessLog {
    /// Access logger name.
    pub name: String,
    /// Logger configuration. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// One filter chain of a listener.
///
/// A chain is served by a single HTTP connection manager that fetches
/// `route_config_name` over the aggregated stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChain {
    /// Optional chain name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Server names matched by this chain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_names: Vec<String>,
    /// Route configuration fetched over RDS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_config_name: Option<String>,
    /// HTTP filters, applied in order.
    #[serde(default)]
    pub http_filters: Vec<HttpFilter>,
    /// Access logs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_logs: Vec<AccessLog>,
}

/// Listener (LDS).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    /// Listener name.
    pub name: String,
    /// Bind address. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddress>,
    /// Filter chains.
    #[serde(default)]
    pub filter_chains: Vec<FilterChain>,
}

impl Listener {
    /// A listener with a single HTTP connection manager chain routing
    /// through `route_config_name`.
    #[must_use]
    pub fn http(name: impl Into<String>, address: SocketAddress, route_config_name: &str) -> Self {
        Self {
            name: name.into(),
            address: Some(address),
            filter_chains: vec![FilterChain {
                route_config_name: Some(route_config_name.to_string()),
                http_filters: vec![HttpFilter {
                    name: "envoy.filters.http.router".to_string(),
                    typed_config: Some(serde_json::json!({ "@type": ROUTER_TYPE_URL })),
                }],
                ..FilterChain::default()
            }],
        }
    }

    /// The Envoy message this listener encodes to.
    ///
    /// # Errors
    ///
    /// Fails if a chain has no route configuration or an embedded config
    /// cannot be packed.
    pub fn to_proto(&self) -> Result<wire::Listener, String> {
        let filter_chains = self
            .filter_chains
            .iter()
            .map(|chain| self.chain_to_proto(chain))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(wire::Listener {
            name: self.name.clone(),
            address: self.address.as_ref().map(SocketAddress::to_proto),
            filter_chains,
        })
    }

    fn chain_to_proto(&self, chain: &FilterChain) -> Result<wire::FilterChain, String> {
        let route_config_name = chain
            .route_config_name
            .clone()
            .ok_or_else(|| "filter chain has no route_config_name".to_string())?;

        let http_filters = chain
            .http_filters
            .iter()
            .map(|filter| {
                let config = filter
                    .typed_config
                    .as_ref()
                    .ok_or_else(|| format!("http filter {} has no config", filter.name))?;
                Ok(hcm::HttpFilter {
                    name: filter.name.clone(),
                    typed_config: Some(
                        pack_typed_config(config).map_err(|e| format!("http filter {}: {e}", filter.name))?,
                    ),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        let access_log = chain
            .access_logs
            .iter()
            .map(|log| {
                let config = log
                    .config
                    .as_ref()
                    .ok_or_else(|| format!("access log {} has no config", log.name))?;
                Ok(accesslog::AccessLog {
                    name: log.name.clone(),
                    typed_config: Some(
                        pack_typed_config(config).map_err(|e| format!("access log {}: {e}", log.name))?,
                    ),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        let manager = hcm::HttpConnectionManager {
            stat_prefix: if chain.name.is_empty() {
                self.name.clone()
            } else {
                chain.name.clone()
            },
            rds: Some(hcm::Rds {
                config_source: Some(core::ConfigSource::ads()),
                route_config_name,
            }),
            http_filters,
            access_log,
        };

        Ok(wire::FilterChain {
            filter_chain_match: (!chain.server_names.is_empty()).then(|| wire::FilterChainMatch {
                server_names: chain.server_names.clone(),
            }),
            filters: vec![wire::Filter {
                name: hcm::FILTER_NAME.to_string(),
                typed_config: Some(prost_types::Any {
                    type_url: hcm::TYPE_URL.to_string(),
                    value: manager.encode_to_vec(),
                }),
            }],
            name: chain.name.clone(),
        })
    }
}

impl Resource for Listener {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Listener
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> EncodeResult {
        encode_proto(self.kind(), &self.to_proto()?)
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        json_view(self)
    }

    fn validate(&self) -> Result<(), String> {
        self.address
            .as_ref()
            .ok_or_else(|| "listener address is required".to_string())?
            .validate()?;

        for chain in &self.filter_chains {
            if chain.http_filters.iter().any(|f| f.name.is_empty()) {
                return Err("http filter name is required".to_string());
            }
            if chain.access_logs.iter().any(|l| l.name.is_empty()) {
                return Err("access log name is required".to_string());
            }
        }
        self.to_proto().map(|_| ())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
