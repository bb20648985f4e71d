//! Typed xDS resources.
//!
//! These are the resource shapes the control plane produces from user
//! configuration objects. Each type implements [`Resource`](crate::Resource)
//! by mapping itself onto the Envoy v3 message of its kind and encoding that
//! message as protobuf. The serde form is the input format for seeding and
//! the JSON view shown by the debug API.
//!
//! Extension configs (HTTP filters, access loggers) are JSON objects naming
//! their message type under `"@type"`, the same convention as protobuf JSON.
//! A config with no other fields encodes as an empty message of that type;
//! anything else travels as an `xds.type.v3.TypedStruct`, which the proxy
//! converts into the named message.

mod cluster;
mod endpoint;
mod listener;
mod route;
mod secret;

pub use cluster::{Cluster, DiscoveryType, EdsClusterConfig, LbPolicy};
pub use endpoint::{ClusterLoadAssignment, LocalityLbEndpoints};
pub use listener::{AccessLog, FilterChain, HttpFilter, Listener, SocketAddress};
pub use route::{Route, RouteConfiguration, VirtualHost};
pub use secret::{Secret, TlsCertificate, ValidationContext};

use prost::Message;
use prost_types::value::Kind;
use serde::Serialize;
use xds_types::xds::r#type::v3::{TypedStruct, TYPED_STRUCT_TYPE_URL};

use crate::ResourceKind;

/// Key naming the message type of a JSON extension config.
pub const TYPE_KEY: &str = "@type";

type EncodeResult = Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>>;

fn encode_proto<M: Message>(kind: ResourceKind, message: &M) -> EncodeResult {
    Ok(prost_types::Any {
        type_url: kind.type_url().to_string(),
        value: message.encode_to_vec(),
    })
}

fn json_view<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Pack a JSON extension config into an `Any`.
///
/// # Errors
///
/// Fails if `config` is not an object or has no `"@type"` string.
pub fn pack_typed_config(config: &serde_json::Value) -> Result<prost_types::Any, String> {
    let fields = config
        .as_object()
        .ok_or_else(|| "config must be a JSON object".to_string())?;
    let type_url = fields
        .get(TYPE_KEY)
        .and_then(serde_json::Value::as_str)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| format!("config has no {TYPE_KEY:?} field"))?;

    let rest: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .filter(|(key, _)| key.as_str() != TYPE_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if rest.is_empty() {
        return Ok(prost_types::Any {
            type_url: type_url.to_string(),
            value: Vec::new(),
        });
    }

    let typed = TypedStruct {
        type_url: type_url.to_string(),
        value: Some(to_struct(&rest)),
    };
    Ok(prost_types::Any {
        type_url: TYPED_STRUCT_TYPE_URL.to_string(),
        value: typed.encode_to_vec(),
    })
}

fn to_struct(map: &serde_json::Map<String, serde_json::Value>) -> prost_types::Struct {
    prost_types::Struct {
        fields: map
            .iter()
            .map(|(key, value)| (key.clone(), to_value(value)))
            .collect(),
    }
}

fn to_value(value: &serde_json::Value) -> prost_types::Value {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(prost_types::NullValue::NullValue as i32),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(prost_types::ListValue {
            values: items.iter().map(to_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(to_struct(map)),
    };
    prost_types::Value { kind: Some(kind) }
}
