//! Control plane configuration file.
//!
//! The binary reads an optional TOML file and then applies command line
//! overrides. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! listen = "[::]:18000"
//! log_filter = "info,xds_server=debug"
//!
//! [server]
//! enable_delta = true
//! grace_period_secs = 10
//!
//! [debug_api]
//! enabled = true
//! addr = "127.0.0.1:9901"
//!
//! [[resources]]
//! node = "fleet-a"
//! kind = "clusters"
//! name = "svc-1"
//! body = { type = "EDS", eds_cluster_config = {}, connect_timeout_ms = 250 }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use xds_core::resources::{Cluster, ClusterLoadAssignment, Listener, RouteConfiguration, Secret};
use xds_core::{BoxResource, NodeId, ResourceKind, XdsError};
use xds_server::{DebugApiConfig, ServerConfig};

/// Error loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A seed resource could not be turned into a typed resource.
    #[error("seed resource {node}/{kind}/{name}: {message}")]
    Seed {
        /// Node of the entry.
        node: String,
        /// Kind of the entry.
        kind: String,
        /// Name of the entry.
        name: String,
        /// What went wrong.
        message: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlPlaneConfig {
    /// gRPC listen address.
    pub listen: SocketAddr,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Discovery server settings.
    pub server: ServerSection,
    /// Debug HTTP API settings.
    pub debug_api: DebugApiSection,
    /// Resources written to the store at startup.
    pub resources: Vec<SeedResource>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], 18000)),
            log_filter: "info".to_string(),
            server: ServerSection::default(),
            debug_api: DebugApiSection::default(),
            resources: Vec::new(),
        }
    }
}

/// `[server]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Serve state-of-the-world streams.
    pub enable_sotw: bool,
    /// Serve incremental streams.
    pub enable_delta: bool,
    /// Concurrent streams per connection, `0` for no limit.
    pub max_concurrent_streams: u32,
    /// HTTP/2 keepalive interval, `0` to disable.
    pub keepalive_interval_secs: u64,
    /// HTTP/2 keepalive timeout.
    pub keepalive_timeout_secs: u64,
    /// Maximum decoded request size in bytes.
    pub max_request_size: usize,
    /// Responses buffered per stream.
    pub response_buffer_size: usize,
    /// Seconds shutdown waits for open streams.
    pub grace_period_secs: u64,
    /// Refuse nodes with no resources. Defaults to `true`.
    pub require_known_node: bool,
    /// Identifier attached to every response.
    pub control_plane_id: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            enable_sotw: defaults.enable_sotw,
            enable_delta: defaults.enable_delta,
            max_concurrent_streams: defaults.max_concurrent_streams.unwrap_or(0),
            keepalive_interval_secs: defaults.keepalive_interval.map_or(0, |d| d.as_secs()),
            keepalive_timeout_secs: defaults.keepalive_timeout.map_or(0, |d| d.as_secs()),
            max_request_size: defaults.max_request_size,
            response_buffer_size: defaults.response_buffer_size,
            grace_period_secs: defaults.grace_period.as_secs(),
            require_known_node: defaults.require_known_node,
            control_plane_id: defaults.control_plane_id,
        }
    }
}

/// `[debug_api]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugApiSection {
    /// Serve the debug API.
    pub enabled: bool,
    /// Listen address.
    pub addr: SocketAddr,
}

impl Default for DebugApiSection {
    fn default() -> Self {
        let defaults = DebugApiConfig::default();
        Self {
            enabled: defaults.enabled,
            addr: defaults.addr,
        }
    }
}

/// One `[[resources]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedResource {
    /// Node the resource is written for.
    pub node: String,
    /// Kind, as a type URL, short name or plural.
    pub kind: String,
    /// Resource name.
    pub name: String,
    /// Resource body. The name field may be omitted.
    #[serde(default)]
    pub body: serde_json::Value,
}

impl SeedResource {
    /// Turn the entry into a typed resource.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Seed`] for an unknown kind or a body that does
    /// not fit the kind's schema.
    pub fn to_resource(&self) -> Result<(NodeId, ResourceKind, BoxResource), ConfigError> {
        let kind: ResourceKind = self
            .kind
            .parse()
            .map_err(|e: XdsError| self.error(e.to_string()))?;

        let mut body = match &self.body {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        if let Some(fields) = body.as_object_mut() {
            let key = match kind {
                ResourceKind::Endpoint => "cluster_name",
                _ => "name",
            };
            fields
                .entry(key)
                .or_insert_with(|| serde_json::Value::String(self.name.clone()));
        }

        let resource: BoxResource = match kind {
            ResourceKind::Cluster => Arc::new(self.decode::<Cluster>(body)?),
            ResourceKind::Listener => Arc::new(self.decode::<Listener>(body)?),
            ResourceKind::RouteConfiguration => Arc::new(self.decode::<RouteConfiguration>(body)?),
            ResourceKind::Endpoint => Arc::new(self.decode::<ClusterLoadAssignment>(body)?),
            ResourceKind::Secret => Arc::new(self.decode::<Secret>(body)?),
        };

        Ok((NodeId::new(&self.node), kind, resource))
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, body: serde_json::Value) -> Result<T, ConfigError> {
        serde_json::from_value(body).map_err(|e| self.error(e.to_string()))
    }

    fn error(&self, message: String) -> ConfigError {
        ConfigError::Seed {
            node: self.node.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            message,
        }
    }
}

impl ControlPlaneConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.enable_sotw && !self.server.enable_delta {
            return Err(ConfigError::Invalid(
                "at least one of server.enable_sotw and server.enable_delta must be set".into(),
            ));
        }
        if self.server.response_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "server.response_buffer_size must be positive".into(),
            ));
        }
        if self.server.max_request_size == 0 {
            return Err(ConfigError::Invalid(
                "server.max_request_size must be positive".into(),
            ));
        }
        if self.debug_api.enabled && self.debug_api.addr == self.listen {
            return Err(ConfigError::Invalid(
                "debug_api.addr must differ from listen".into(),
            ));
        }
        for seed in &self.resources {
            if seed.node.is_empty() || seed.name.is_empty() {
                return Err(seed.error("node and name are required".into()));
            }
        }
        Ok(())
    }

    /// The discovery server configuration this file describes.
    pub fn server_config(&self) -> ServerConfig {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        ServerConfig {
            enable_sotw: self.server.enable_sotw,
            enable_delta: self.server.enable_delta,
            max_concurrent_streams: (self.server.max_concurrent_streams > 0)
                .then_some(self.server.max_concurrent_streams),
            keepalive_interval: secs(self.server.keepalive_interval_secs),
            keepalive_timeout: secs(self.server.keepalive_timeout_secs),
            max_request_size: self.server.max_request_size,
            response_buffer_size: self.server.response_buffer_size,
            grace_period: Duration::from_secs(self.server.grace_period_secs),
            require_known_node: self.server.require_known_node,
            control_plane_id: self.server.control_plane_id.clone(),
            debug_api: DebugApiConfig {
                enabled: self.debug_api.enabled,
                addr: self.debug_api.addr,
            },
        }
    }
}
