use std::any::Any;

use serde::{Deserialize, Serialize};
use xds_types::envoy::config::cluster::v3 as wire;
use xds_types::envoy::config::core::v3::ConfigSource;

use super::{encode_proto, json_view, ClusterLoadAssignment, EncodeResult};
use crate::{Resource, ResourceKind};

/// How a cluster discovers its endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    /// Endpoints listed inline in `load_assignment`.
    Static,
    /// Resolved through DNS, all addresses used.
    StrictDns,
    /// Resolved through DNS, first address used.
    LogicalDns,
    /// Endpoints delivered over EDS.
    Eds,
    /// Original destination of the downstream connection.
    OriginalDst,
}

impl From<DiscoveryType> for wire::DiscoveryType {
    fn from(t: DiscoveryType) -> Self {
        match t {
            DiscoveryType::Static => Self::Static,
            DiscoveryType::StrictDns => Self::StrictDns,
            DiscoveryType::LogicalDns => Self::LogicalDns,
            DiscoveryType::Eds => Self::Eds,
            DiscoveryType::OriginalDst => Self::OriginalDst,
        }
    }
}

/// Load balancing policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbPolicy {
    /// Round robin.
    #[default]
    RoundRobin,
    /// Least request.
    LeastRequest,
    /// Ring hash.
    RingHash,
    /// Random.
    Random,
    /// Maglev.
    Maglev,
}

impl From<LbPolicy> for wire::LbPolicy {
    fn from(p: LbPolicy) -> Self {
        match p {
            LbPolicy::RoundRobin => Self::RoundRobin,
            LbPolicy::LeastRequest => Self::LeastRequest,
            LbPolicy::RingHash => Self::RingHash,
            LbPolicy::Random => Self::Random,
            LbPolicy::Maglev => Self::Maglev,
        }
    }
}

/// EDS settings of a cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdsClusterConfig {
    /// Name requested over EDS, defaults to the cluster name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

/// Upstream cluster (CDS).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster name.
    pub name: String,
    /// Endpoint discovery type. Required.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub discovery_type: Option<DiscoveryType>,
    /// Connect timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Load balancing policy.
    #[serde(default)]
    pub lb_policy: LbPolicy,
    /// EDS settings, required when `discovery_type` is EDS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eds_cluster_config: Option<EdsClusterConfig>,
    /// Inline endpoints for static and DNS clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_assignment: Option<ClusterLoadAssignment>,
}

impl Cluster {
    /// An EDS cluster with default settings.
    #[must_use]
    pub fn eds(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            discovery_type: Some(DiscoveryType::Eds),
            connect_timeout_ms: None,
            lb_policy: LbPolicy::default(),
            eds_cluster_config: Some(EdsClusterConfig::default()),
            load_assignment: None,
        }
    }

    /// A static cluster with inline endpoints.
    #[must_use]
    pub fn with_static_endpoints(name: impl Into<String>, endpoints: ClusterLoadAssignment) -> Self {
        Self {
            name: name.into(),
            discovery_type: Some(DiscoveryType::Static),
            connect_timeout_ms: None,
            lb_policy: LbPolicy::default(),
            eds_cluster_config: None,
            load_assignment: Some(endpoints),
        }
    }

    /// The Envoy message this cluster encodes to. EDS clusters fetch their
    /// endpoints over the aggregated stream.
    #[must_use]
    pub fn to_proto(&self) -> wire::Cluster {
        wire::Cluster {
            name: self.name.clone(),
            r#type: self
                .discovery_type
                .map(|t| wire::DiscoveryType::from(t) as i32),
            eds_cluster_config: self.eds_cluster_config.as_ref().map(|eds| wire::EdsClusterConfig {
                eds_config: Some(ConfigSource::ads()),
                service_name: eds.service_name.clone().unwrap_or_default(),
            }),
            connect_timeout: self.connect_timeout_ms.map(|ms| prost_types::Duration {
                seconds: i64::try_from(ms / 1000).unwrap_or(i64::MAX),
                nanos: ((ms % 1000) * 1_000_000) as i32,
            }),
            lb_policy: wire::LbPolicy::from(self.lb_policy) as i32,
            load_assignment: self
                .load_assignment
                .as_ref()
                .map(ClusterLoadAssignment::to_proto),
        }
    }
}

impl Resource for Cluster {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Cluster
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
        match self.discovery_type {
            None => Err("cluster discovery type is required".to_string()),
            Some(DiscoveryType::Eds) if self.eds_cluster_config.is_none() => {
                Err("EDS cluster requires eds_cluster_config".to_string())
            }
            Some(_) => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
