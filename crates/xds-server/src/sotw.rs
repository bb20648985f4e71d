//! State-of-the-World (SotW) stream driver.
//!
//! SotW is the original xDS protocol where the entire resource set of a kind
//! is sent on each update. [`SotwConnection`] owns one stream: it binds the
//! node from the first request, keeps one [`SotwSession`] and one cache watch
//! per requested kind, and waits on inbound requests and store changes,
//! whichever comes first.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamMap;
use tonic::Status;
use tracing::{debug, info, trace, warn};
use xds_cache::{Cache, ChangeNotification, ShardedCache};
use xds_core::{NodeId, ResourceKind, XdsError, XdsResult};
use xds_types::envoy::config::core::v3::{ControlPlane, Node};
use xds_types::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};

use crate::config::ServerConfig;
use crate::metrics::{StreamTracker, XdsMetrics};
use crate::session::{Push, Reply, SotwSession, Step};
use crate::shutdown::ShutdownController;
use crate::stream::{StreamContext, StreamId, WatchSet};

/// Protocol label used in logs and metrics.
pub(crate) const PROTOCOL: &str = "sotw";

/// Bind the stream's node from a request's node field.
///
/// Later requests may omit the node; a different id is ignored with a
/// warning.
pub(crate) fn bind_node(
    ctx: &mut StreamContext,
    node: Option<&Node>,
    cache: &ShardedCache,
    config: &ServerConfig,
) -> XdsResult<NodeId> {
    if let Some(bound) = ctx.node() {
        if let Some(node) = node.filter(|n| !n.id.is_empty() && n.id != bound.as_str()) {
            warn!(stream = %ctx.id(), bound = %bound, received = %node.id, "node id changed mid-stream, ignoring");
        }
        return Ok(bound.clone());
    }

    let id = node.map(|n| n.id.as_str()).unwrap_or_default();
    if id.is_empty() {
        return Err(XdsError::UnknownNode {
            node_id: String::new(),
        });
    }

    let node_id = NodeId::new(id);
    if config.require_known_node && !cache.has_node(&node_id) {
        return Err(XdsError::UnknownNode {
            node_id: id.to_string(),
        });
    }

    debug!(stream = %ctx.id(), node = %node_id, "node identified");
    ctx.set_node(node_id.clone());
    Ok(node_id)
}

/// One state-of-the-world stream.
#[derive(Debug)]
pub struct SotwConnection {
    cache: Arc<ShardedCache>,
    config: Arc<ServerConfig>,
    metrics: XdsMetrics,
    shutdown: ShutdownController,
    ctx: StreamContext,
    sessions: HashMap<ResourceKind, SotwSession>,
    watches: WatchSet,
    notifications: StreamMap<ResourceKind, ReceiverStream<ChangeNotification>>,
}

impl SotwConnection {
    /// Create a connection driver.
    pub fn new(
        cache: Arc<ShardedCache>,
        config: Arc<ServerConfig>,
        metrics: XdsMetrics,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            watches: WatchSet::new(Arc::clone(&cache)),
            cache,
            config,
            metrics,
            shutdown,
            ctx: StreamContext::new(),
            sessions: HashMap::new(),
            notifications: StreamMap::new(),
        }
    }

    /// Identifier of this stream.
    pub fn stream_id(&self) -> StreamId {
        self.ctx.id()
    }

    /// Drive the stream until the client goes away, the response channel
    /// closes, the server shuts down, or a request is refused.
    ///
    /// All watches are cancelled on return.
    pub async fn run<S>(mut self, mut requests: S, tx: mpsc::Sender<Result<DiscoveryResponse, Status>>)
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Unpin + Send,
    {
        let _operation = self.shutdown.register_operation();
        let _tracker = StreamTracker::new(self.metrics.clone(), PROTOCOL);
        let shutdown = self.shutdown.shutdown_signal().wait();
        tokio::pin!(shutdown);

        info!("stream started");

        loop {
            tokio::select! {
                request = requests.next() => match request {
                    Some(Ok(request)) => match self.handle_request(request) {
                        Ok(Some(response)) => {
                            if tx.send(Ok(response)).await.is_err() {
                                debug!("client disconnected");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "refusing stream");
                            self.metrics.record_refused_stream(PROTOCOL);
                            let _ = tx.send(Err(e.into())).await;
                            break;
                        }
                    },
                    Some(Err(status)) => {
                        debug!(status = %status, "stream error");
                        break;
                    }
                    None => {
                        debug!("client closed stream");
                        break;
                    }
                },
                Some((kind, notification)) = self.notifications.next(), if !self.notifications.is_empty() => {
                    if let Some(response) = self.handle_change(kind, notification) {
                        if tx.send(Ok(response)).await.is_err() {
                            debug!("client disconnected");
                            break;
                        }
                    }
                }
                _ = tx.closed() => {
                    debug!("response channel closed");
                    break;
                }
                _ = &mut shutdown => {
                    debug!("server shutting down");
                    break;
                }
            }
        }

        info!(
            node = ?self.ctx.node().map(NodeId::as_str),
            duration = ?self.ctx.duration(),
            requests = self.ctx.request_count(),
            responses = self.ctx.response_count(),
            watches = self.watches.len(),
            "stream ended"
        );

        // Cancel watches before the response channel closes.
        drop(self);
    }

    fn handle_request(&mut self, request: DiscoveryRequest) -> XdsResult<Option<DiscoveryResponse>> {
        self.ctx.record_request();
        let node = bind_node(&mut self.ctx, request.node.as_ref(), &self.cache, &self.config)?;

        let Some(kind) = ResourceKind::from_type_url(&request.type_url) else {
            warn!(type_url = %request.type_url, "ignoring request for unknown type");
            self.metrics.record_unknown_type();
            return Ok(None);
        };
        self.metrics.record_request(kind);

        trace!(
            kind = %kind,
            version = %request.version_info,
            nonce = %request.response_nonce,
            names = ?request.resource_names,
            "processing request"
        );

        if !self.sessions.contains_key(&kind) {
            let watch = self.cache.create_watch(node.clone(), kind);
            self.watches.push(watch.id());
            self.notifications
                .insert(kind, ReceiverStream::new(watch.into_receiver()));
        }
        let session = self
            .sessions
            .entry(kind)
            .or_insert_with(|| SotwSession::new(node.clone(), kind));

        let snapshot = self.cache.build(&node);
        let Step { reply, push } = session.on_request(&request, &snapshot);

        match reply {
            Some(Reply::Accepted(_)) => self.metrics.record_ack(kind),
            Some(Reply::Rejected(_)) => self.metrics.record_nack(kind),
            Some(Reply::Stale(_)) => self.metrics.record_stale_nonce(kind),
            None => {}
        }

        Ok(push.map(|push| self.respond(push)))
    }

    fn handle_change(
        &mut self,
        kind: ResourceKind,
        notification: ChangeNotification,
    ) -> Option<DiscoveryResponse> {
        trace!(kind = %kind, version = %notification.version, "store changed");
        let session = self.sessions.get_mut(&kind)?;
        let snapshot = self.cache.build(&notification.node);
        let push = session.on_change(&snapshot)?;
        Some(self.respond(push))
    }

    fn respond(&mut self, push: Push) -> DiscoveryResponse {
        self.ctx.record_response();
        self.metrics.record_push(push.kind, push.resources.len());

        info!(
            kind = %push.kind,
            version = %push.version,
            nonce = %push.nonce,
            count = push.resources.len(),
            "sending response"
        );

        DiscoveryResponse {
            version_info: push.version.to_string(),
            resources: push.resources.iter().map(|r| r.encoded().clone()).collect(),
            canary: false,
            type_url: push.kind.type_url().to_string(),
            nonce: push.nonce,
            control_plane: self
                .config
                .control_plane_id
                .as_ref()
                .map(|identifier| ControlPlane {
                    identifier: identifier.clone(),
                }),
        }
    }
}
