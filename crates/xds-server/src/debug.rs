//! Read-only debug HTTP API over the resource store.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /api/v1/nodes` | known node ids |
//! | `GET /api/v1/nodes/{node}` | snapshot summary |
//! | `GET /api/v1/nodes/{node}/{kind}` | resources of one kind, in name order |
//!
//! `{kind}` accepts a type URL, a short name (`Cluster`) or a plural
//! (`clusters`). Handlers only read from the store.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info};
use xds_cache::{Cache, ShardedCache};
use xds_core::{NodeId, ResourceKind, StoredResource, XdsError};

/// Build the debug API router.
pub fn router(cache: Arc<ShardedCache>) -> Router {
    Router::new()
        .route("/api/v1/nodes", get(list_nodes))
        .route("/api/v1/nodes/{node}", get(node_summary))
        .route("/api/v1/nodes/{node}/{kind}", get(node_resources))
        .with_state(cache)
}

/// Serve the debug API on a bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, cache: Arc<ShardedCache>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "debug API listening");
    axum::serve(listener, router(cache))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Summary of one node.
#[derive(Debug, Serialize)]
pub struct NodeSummary {
    /// Node id.
    pub node: NodeId,
    /// Snapshot version, as sent on the wire.
    pub version: String,
    /// Per-kind details, for every kind ever written.
    pub kinds: Vec<KindSummary>,
}

/// Summary of one kind on a node.
#[derive(Debug, Serialize)]
pub struct KindSummary {
    /// Kind.
    pub kind: ResourceKind,
    /// Kind version, as sent on the wire.
    pub version: String,
    /// Number of resources.
    pub resources: usize,
}

/// One resource as shown by the debug API.
#[derive(Debug, Serialize)]
pub struct ResourceView {
    /// Resource name.
    pub name: String,
    /// Content fingerprint.
    pub version: String,
    /// Type URL.
    pub type_url: String,
    /// JSON view of the body, or `null` for opaque payloads.
    pub body: serde_json::Value,
}

impl From<&StoredResource> for ResourceView {
    fn from(resource: &StoredResource) -> Self {
        Self {
            name: resource.name().to_string(),
            version: resource.version_string(),
            type_url: resource.encoded().type_url.clone(),
            body: resource.resource().to_json().unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Debug API error.
#[derive(Debug)]
pub enum DebugError {
    /// The path named an unknown kind.
    BadKind(XdsError),
    /// The node has no resources.
    NotFound(NodeId),
}

impl IntoResponse for DebugError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            DebugError::BadKind(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            DebugError::NotFound(node) => (StatusCode::NOT_FOUND, format!("unknown node {node}")),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn list_nodes(State(cache): State<Arc<ShardedCache>>) -> Json<Vec<NodeId>> {
    Json(cache.nodes().into_iter().collect())
}

async fn node_summary(
    State(cache): State<Arc<ShardedCache>>,
    Path(node): Path<String>,
) -> Result<Json<NodeSummary>, DebugError> {
    let node = NodeId::new(node);
    let snapshot = cache.build(&node);
    if snapshot.version().is_empty() {
        return Err(DebugError::NotFound(node));
    }

    let kinds = ResourceKind::ALL
        .iter()
        .filter(|kind| !snapshot.kind_version(**kind).is_empty())
        .map(|&kind| KindSummary {
            kind,
            version: snapshot.kind_version(kind).to_string(),
            resources: snapshot.get_resources(kind).map_or(0, |r| r.len()),
        })
        .collect();

    Ok(Json(NodeSummary {
        version: snapshot.version().to_string(),
        node,
        kinds,
    }))
}

async fn node_resources(
    State(cache): State<Arc<ShardedCache>>,
    Path((node, kind)): Path<(String, String)>,
) -> Result<Json<Vec<ResourceView>>, DebugError> {
    let kind: ResourceKind = kind.parse().map_err(DebugError::BadKind)?;
    let node = NodeId::new(node);
    debug!(node = %node, kind = %kind, "debug read");

    let resources = cache.get(&node, kind);
    Ok(Json(resources.iter().map(ResourceView::from).collect()))
}
