//! # xds-types
//!
//! Protobuf messages of the Envoy v3 discovery protocol.
//!
//! This crate defines the wire types exchanged on an aggregated discovery
//! stream, with field tags matching the Envoy data-plane API so real proxies
//! can talk to the server:
//!
//! - State-of-the-world messages (`DiscoveryRequest`, `DiscoveryResponse`)
//! - Incremental messages (`DeltaDiscoveryRequest`, `DeltaDiscoveryResponse`,
//!   `Resource`)
//! - Node identity (`Node`, `Locality`, `ControlPlane`)
//! - `google.rpc.Status`, carried in NACKs
//! - The resource bodies the control plane serves: `Cluster`,
//!   `ClusterLoadAssignment`, `Listener` (with the HTTP connection manager),
//!   `RouteConfiguration` and the TLS `Secret`
//!
//! Resource messages model the subset of fields the control plane sets.
//! Oneof arms that are the only modelled arm are flattened into optional
//! fields, which encode identically.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![allow(missing_docs)] // Mirrors protobuf definitions field by field

pub use prost::Message;
pub use prost_types::Any;

pub mod envoy {
    //! Envoy xDS types.

    pub mod service {
        //! Envoy discovery service definitions.

        pub mod discovery {
            //! Core discovery service types.

            pub mod v3 {
                //! Discovery service v3 API.

                use crate::envoy::config::core::v3::{ControlPlane, Node};
                use crate::google::rpc::Status;

                /// Discovery request sent by clients.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DiscoveryRequest {
                    /// Version being acknowledged (empty on first request).
                    #[prost(string, tag = "1")]
                    pub version_info: String,
                    /// Node information.
                    #[prost(message, optional, tag = "2")]
                    pub node: Option<Node>,
                    /// Requested resource names (empty for wildcard).
                    #[prost(string, repeated, tag = "3")]
                    pub resource_names: Vec<String>,
                    /// Type URL of requested resources.
                    #[prost(string, tag = "4")]
                    pub type_url: String,
                    /// Nonce of the response being acknowledged.
                    #[prost(string, tag = "5")]
                    pub response_nonce: String,
                    /// Error details if this is a NACK.
                    #[prost(message, optional, tag = "6")]
                    pub error_detail: Option<Status>,
                }

                /// Discovery response sent by servers.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DiscoveryResponse {
                    /// Version of this response.
                    #[prost(string, tag = "1")]
                    pub version_info: String,
                    /// Resources.
                    #[prost(message, repeated, tag = "2")]
                    pub resources: Vec<prost_types::Any>,
                    /// Whether this is a canary response.
                    #[prost(bool, tag = "3")]
                    pub canary: bool,
                    /// Type URL of the resources.
                    #[prost(string, tag = "4")]
                    pub type_url: String,
                    /// Unique nonce for this response.
                    #[prost(string, tag = "5")]
                    pub nonce: String,
                    /// Control plane identifier.
                    #[prost(message, optional, tag = "6")]
                    pub control_plane: Option<ControlPlane>,
                }

                /// Delta discovery request.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DeltaDiscoveryRequest {
                    /// Node information.
                    #[prost(message, optional, tag = "1")]
                    pub node: Option<Node>,
                    /// Type URL of requested resources.
                    #[prost(string, tag = "2")]
                    pub type_url: String,
                    /// Resources to subscribe to.
                    #[prost(string, repeated, tag = "3")]
                    pub resource_names_subscribe: Vec<String>,
                    /// Resources to unsubscribe from.
                    #[prost(string, repeated, tag = "4")]
                    pub resource_names_unsubscribe: Vec<String>,
                    /// Resource versions the client already holds.
                    #[prost(map = "string, string", tag = "5")]
                    pub initial_resource_versions: std::collections::HashMap<String, String>,
                    /// Nonce of the response being acknowledged.
                    #[prost(string, tag = "6")]
                    pub response_nonce: String,
                    /// Error details if this is a NACK.
                    #[prost(message, optional, tag = "7")]
                    pub error_detail: Option<Status>,
                }

                /// Delta discovery response.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DeltaDiscoveryResponse {
                    /// System version info.
                    #[prost(string, tag = "1")]
                    pub system_version_info: String,
                    /// Updated resources.
                    #[prost(message, repeated, tag = "2")]
                    pub resources: Vec<Resource>,
                    /// Type URL of the resources.
                    #[prost(string, tag = "4")]
                    pub type_url: String,
                    /// Unique nonce for this response.
                    #[prost(string, tag = "5")]
                    pub nonce: String,
                    /// Removed resource names.
                    #[prost(string, repeated, tag = "6")]
                    pub removed_resources: Vec<String>,
                    /// Control plane identifier.
                    #[prost(message, optional, tag = "7")]
                    pub control_plane: Option<ControlPlane>,
                }

                /// A resource in a delta response.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Resource {
                    /// Resource version.
                    #[prost(string, tag = "1")]
                    pub version: String,
                    /// The resource.
                    #[prost(message, optional, tag = "2")]
                    pub resource: Option<prost_types::Any>,
                    /// Resource name.
                    #[prost(string, tag = "3")]
                    pub name: String,
                    /// Aliases for this resource.
                    #[prost(string, repeated, tag = "4")]
                    pub aliases: Vec<String>,
                }
            }
        }
    }

    pub mod config {
        //! Envoy configuration types.

        pub mod core {
            //! Core configuration types.

            pub mod v3 {
                //! Core v3 API.

                /// Node information.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Node {
                    /// Node identifier.
                    #[prost(string, tag = "1")]
                    pub id: String,
                    /// Cluster the node belongs to.
                    #[prost(string, tag = "2")]
                    pub cluster: String,
                    /// Node metadata.
                    #[prost(message, optional, tag = "3")]
                    pub metadata: Option<prost_types::Struct>,
                    /// Locality.
                    #[prost(message, optional, tag = "4")]
                    pub locality: Option<Locality>,
                    /// User agent name.
                    #[prost(string, tag = "6")]
                    pub user_agent_name: String,
                    /// User agent version.
                    #[prost(string, tag = "7")]
                    pub user_agent_version: String,
                    /// Client features.
                    #[prost(string, repeated, tag = "10")]
                    pub client_features: Vec<String>,
                }

                /// Control plane identifier.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct ControlPlane {
                    /// Identifier for this control plane.
                    #[prost(string, tag = "1")]
                    pub identifier: String,
                }

                /// Locality information.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Locality {
                    /// Region.
                    #[prost(string, tag = "1")]
                    pub region: String,
                    /// Zone.
                    #[prost(string, tag = "2")]
                    pub zone: String,
                    /// Sub-zone.
                    #[prost(string, tag = "3")]
                    pub sub_zone: String,
                }

                /// Transport protocol of a socket address.
                #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
                #[repr(i32)]
                pub enum SocketProtocol {
                    Tcp = 0,
                    Udp = 1,
                }

                /// An IP socket address.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct SocketAddress {
                    #[prost(enumeration = "SocketProtocol", tag = "1")]
                    pub protocol: i32,
                    #[prost(string, tag = "2")]
                    pub address: String,
                    /// `port_specifier` oneof, `port_value` arm.
                    #[prost(uint32, optional, tag = "3")]
                    pub port_value: Option<u32>,
                }

                /// A network address. Only the `socket_address` arm is modelled.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Address {
                    #[prost(message, optional, tag = "1")]
                    pub socket_address: Option<SocketAddress>,
                }

                /// xDS API version of a config source.
                #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
                #[repr(i32)]
                pub enum ApiVersion {
                    Auto = 0,
                    V2 = 1,
                    V3 = 2,
                }

                /// Fetch resources over the aggregated stream.
                #[derive(Clone, Copy, PartialEq, ::prost::Message)]
                pub struct AggregatedConfigSource {}

                /// Where a resource is fetched from. Only the `ads` arm is modelled.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct ConfigSource {
                    #[prost(message, optional, tag = "3")]
                    pub ads: Option<AggregatedConfigSource>,
                    #[prost(enumeration = "ApiVersion", tag = "6")]
                    pub resource_api_version: i32,
                }

                impl ConfigSource {
                    /// Fetch over ADS with the v3 API.
                    pub fn ads() -> Self {
                        Self {
                            ads: Some(AggregatedConfigSource {}),
                            resource_api_version: ApiVersion::V3 as i32,
                        }
                    }
                }

                /// Inline or file data. Only the `inline_string` arm is modelled.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DataSource {
                    #[prost(string, optional, tag = "3")]
                    pub inline_string: Option<String>,
                }
            }
        }

        pub mod cluster {
            //! Cluster configuration.

            pub mod v3 {
                //! Cluster v3 API.

                use crate::envoy::config::core::v3::ConfigSource;
                use crate::envoy::config::endpoint::v3::ClusterLoadAssignment;

                #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
                #[repr(i32)]
                pub enum DiscoveryType {
                    Static = 0,
                    StrictDns = 1,
                    LogicalDns = 2,
                    Eds = 3,
                    OriginalDst = 4,
                }

                #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
                #[repr(i32)]
                pub enum LbPolicy {
                    RoundRobin = 0,
                    LeastRequest = 1,
                    RingHash = 2,
                    Random = 3,
                    Maglev = 5,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct EdsClusterConfig {
                    #[prost(message, optional, tag = "1")]
                    pub eds_config: Option<ConfigSource>,
                    #[prost(string, tag = "2")]
                    pub service_name: String,
                }

                /// Upstream cluster.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Cluster {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    /// `cluster_discovery_type` oneof, `type` arm.
                    #[prost(enumeration = "DiscoveryType", optional, tag = "2")]
                    pub r#type: Option<i32>,
                    #[prost(message, optional, tag = "3")]
                    pub eds_cluster_config: Option<EdsClusterConfig>,
                    #[prost(message, optional, tag = "4")]
                    pub connect_timeout: Option<prost_types::Duration>,
                    #[prost(enumeration = "LbPolicy", tag = "6")]
                    pub lb_policy: i32,
                    #[prost(message, optional, tag = "33")]
                    pub load_assignment: Option<ClusterLoadAssignment>,
                }
            }
        }

        pub mod endpoint {
            //! Endpoint configuration.

            pub mod v3 {
                //! Endpoint v3 API.

                use crate::envoy::config::core::v3::{Address, Locality};

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Endpoint {
                    #[prost(message, optional, tag = "1")]
                    pub address: Option<Address>,
                }

                /// `host_identifier` oneof, `endpoint` arm only.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct LbEndpoint {
                    #[prost(message, optional, tag = "1")]
                    pub endpoint: Option<Endpoint>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct LocalityLbEndpoints {
                    #[prost(message, optional, tag = "1")]
                    pub locality: Option<Locality>,
                    #[prost(message, repeated, tag = "2")]
                    pub lb_endpoints: Vec<LbEndpoint>,
                }

                /// Endpoints of one cluster.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct ClusterLoadAssignment {
                    #[prost(string, tag = "1")]
                    pub cluster_name: String,
                    #[prost(message, repeated, tag = "2")]
                    pub endpoints: Vec<LocalityLbEndpoints>,
                }
            }
        }

        pub mod listener {
            //! Listener configuration.

            pub mod v3 {
                //! Listener v3 API.

                use crate::envoy::config::core::v3::Address;

                /// A network filter. Only the `typed_config` arm is modelled.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Filter {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(message, optional, tag = "4")]
                    pub typed_config: Option<prost_types::Any>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct FilterChainMatch {
                    #[prost(string, repeated, tag = "11")]
                    pub server_names: Vec<String>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct FilterChain {
                    #[prost(message, optional, tag = "1")]
                    pub filter_chain_match: Option<FilterChainMatch>,
                    #[prost(message, repeated, tag = "3")]
                    pub filters: Vec<Filter>,
                    #[prost(string, tag = "7")]
                    pub name: String,
                }

                /// A listener.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Listener {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(message, optional, tag = "2")]
                    pub address: Option<Address>,
                    #[prost(message, repeated, tag = "3")]
                    pub filter_chains: Vec<FilterChain>,
                }
            }
        }

        pub mod route {
            //! Route configuration.

            pub mod v3 {
                //! Route v3 API.

                /// `path_specifier` oneof, `prefix` arm only.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct RouteMatch {
                    #[prost(string, optional, tag = "1")]
                    pub prefix: Option<String>,
                }

                /// `cluster_specifier` oneof, `cluster` arm only.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct RouteAction {
                    #[prost(string, optional, tag = "1")]
                    pub cluster: Option<String>,
                }

                /// `action` oneof, `route` arm only.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Route {
                    #[prost(message, optional, tag = "1")]
                    pub r#match: Option<RouteMatch>,
                    #[prost(message, optional, tag = "2")]
                    pub route: Option<RouteAction>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct VirtualHost {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(string, repeated, tag = "2")]
                    pub domains: Vec<String>,
                    #[prost(message, repeated, tag = "3")]
                    pub routes: Vec<Route>,
                }

                /// A route configuration.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct RouteConfiguration {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(message, repeated, tag = "2")]
                    pub virtual_hosts: Vec<VirtualHost>,
                }
            }
        }

        pub mod accesslog {
            //! Access log configuration.

            pub mod v3 {
                //! Access log v3 API.

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct AccessLog {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(message, optional, tag = "4")]
                    pub typed_config: Option<prost_types::Any>,
                }
            }
        }
    }

    pub mod extensions {
        //! Envoy extension configuration.

        pub mod filters {
            //! Filter extensions.

            pub mod network {
                //! Network filters.

                pub mod http_connection_manager {
                    //! HTTP connection manager.

                    pub mod v3 {
                        //! HTTP connection manager v3 API.

                        use crate::envoy::config::accesslog::v3::AccessLog;
                        use crate::envoy::config::core::v3::ConfigSource;

                        /// Type URL of [`HttpConnectionManager`].
                        pub const TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";

                        /// Network filter name the manager is registered under.
                        pub const FILTER_NAME: &str = "envoy.filters.network.http_connection_manager";

                        #[derive(Clone, PartialEq, ::prost::Message)]
                        pub struct Rds {
                            #[prost(message, optional, tag = "1")]
                            pub config_source: Option<ConfigSource>,
                            #[prost(string, tag = "2")]
                            pub route_config_name: String,
                        }

                        #[derive(Clone, PartialEq, ::prost::Message)]
                        pub struct HttpFilter {
                            #[prost(string, tag = "1")]
                            pub name: String,
                            #[prost(message, optional, tag = "4")]
                            pub typed_config: Option<prost_types::Any>,
                        }

                        /// Only the `rds` arm of `route_specifier` is modelled.
                        #[derive(Clone, PartialEq, ::prost::Message)]
                        pub struct HttpConnectionManager {
                            #[prost(string, tag = "2")]
                            pub stat_prefix: String,
                            #[prost(message, optional, tag = "3")]
                            pub rds: Option<Rds>,
                            #[prost(message, repeated, tag = "5")]
                            pub http_filters: Vec<HttpFilter>,
                            #[prost(message, repeated, tag = "13")]
                            pub access_log: Vec<AccessLog>,
                        }
                    }
                }
            }
        }

        pub mod transport_sockets {
            //! Transport socket extensions.

            pub mod tls {
                //! TLS transport socket.

                pub mod v3 {
                    //! TLS v3 API.

                    use crate::envoy::config::core::v3::DataSource;

                    #[derive(Clone, PartialEq, ::prost::Message)]
                    pub struct TlsCertificate {
                        #[prost(message, optional, tag = "1")]
                        pub certificate_chain: Option<DataSource>,
                        #[prost(message, optional, tag = "2")]
                        pub private_key: Option<DataSource>,
                    }

                    #[derive(Clone, PartialEq, ::prost::Message)]
                    pub struct CertificateValidationContext {
                        #[prost(message, optional, tag = "1")]
                        pub trusted_ca: Option<DataSource>,
                    }

                    /// An SDS secret. Only the two certificate arms are modelled.
                    #[derive(Clone, PartialEq, ::prost::Message)]
                    pub struct Secret {
                        #[prost(string, tag = "1")]
                        pub name: String,
                        #[prost(message, optional, tag = "2")]
                        pub tls_certificate: Option<TlsCertificate>,
                        #[prost(message, optional, tag = "4")]
                        pub validation_context: Option<CertificateValidationContext>,
                    }
                }
            }
        }
    }
}

pub mod xds {
    //! xDS extension types.

    pub mod r#type {
        //! Shared xDS types.

        pub mod v3 {
            //! xDS type v3 API.

            /// Type URL of [`TypedStruct`].
            pub const TYPED_STRUCT_TYPE_URL: &str = "type.googleapis.com/xds.type.v3.TypedStruct";

            /// An extension config carried as JSON, converted by the proxy
            /// into the message named by `type_url`.
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct TypedStruct {
                #[prost(string, tag = "1")]
                pub type_url: String,
                #[prost(message, optional, tag = "2")]
                pub value: Option<prost_types::Struct>,
            }
        }
    }
}

pub mod google {
    //! Google API types.

    pub mod rpc {
        //! gRPC status types.

        /// Status type for error responses.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Status {
            /// Status code.
            #[prost(int32, tag = "1")]
            pub code: i32,
            /// Status message.
            #[prost(string, tag = "2")]
            pub message: String,
            /// Details.
            #[prost(message, repeated, tag = "3")]
            pub details: Vec<prost_types::Any>,
        }
    }
}
