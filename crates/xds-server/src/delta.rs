//! Delta xDS protocol handler.
//!
//! Delta xDS is an incremental protocol that only sends changed resources
//! rather than the full set on each update. Each resource carries its own
//! version, the hex fingerprint of its encoded bytes, so a client that
//! reconnects with `initial_resource_versions` only receives what changed.
//!
//! ACK/NACK handling follows the state-of-the-world session: one outstanding
//! push per kind, a rejected kind version is never offered again, and the
//! client's resource state only advances on ACK.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamMap;
use tonic::Status;
use tracing::{debug, info, trace, warn};
use xds_cache::{Cache, ChangeNotification, ShardedCache, Snapshot};
use xds_core::{NodeId, ResourceKind, ResourceVersion, StoredResource, XdsError, XdsResult};
use xds_types::envoy::config::core::v3::ControlPlane;
use xds_types::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, Resource,
};

use crate::config::ServerConfig;
use crate::metrics::{StreamTracker, XdsMetrics};
use crate::session::Reply;
use crate::shutdown::ShutdownController;
use crate::sotw::bind_node;
use crate::stream::{generate_nonce, NoncePrefix, StreamContext, StreamId, WatchSet};

/// Protocol label used in logs and metrics.
const PROTOCOL: &str = "delta";

/// Name that explicitly subscribes to every resource of a kind.
const WILDCARD: &str = "*";

/// Tracks the state of resources a client holds.
#[derive(Debug, Default)]
pub struct ClientResourceState {
    /// Resources the client has, keyed by name with version.
    known: BTreeMap<String, String>,
    /// Resources the client has requested (subscription).
    requested: BTreeSet<String>,
    /// Whether wildcard subscription is active.
    wildcard: bool,
}

impl ClientResourceState {
    /// Create a new client resource state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to specific resources. `*` turns on wildcard.
    pub fn subscribe(&mut self, names: impl IntoIterator<Item = String>) {
        for name in names {
            if name == WILDCARD {
                self.wildcard = true;
            } else {
                self.requested.insert(name);
            }
        }
    }

    /// Unsubscribe from specific resources. `*` turns off wildcard.
    pub fn unsubscribe(&mut self, names: impl IntoIterator<Item = String>) {
        for name in names {
            if name == WILDCARD {
                self.wildcard = false;
            } else {
                self.requested.remove(&name);
            }
        }
        let (wildcard, requested) = (self.wildcard, &self.requested);
        self.known
            .retain(|name, _| wildcard || requested.contains(name));
    }

    /// Enable or disable wildcard subscription.
    pub fn set_wildcard(&mut self, wildcard: bool) {
        self.wildcard = wildcard;
    }

    /// Whether wildcard subscription is active.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Check if a resource is subscribed.
    pub fn is_subscribed(&self, name: &str) -> bool {
        self.wildcard || self.requested.contains(name)
    }

    /// Record that the client holds `name` at `version`.
    pub fn mark_known(&mut self, name: String, version: String) {
        self.known.insert(name, version);
    }

    /// Get the version of a resource the client has.
    pub fn client_version(&self, name: &str) -> Option<&str> {
        self.known.get(name).map(String::as_str)
    }

    /// Forget resources the client was told were removed.
    pub fn mark_removed<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            self.known.remove(name);
        }
    }

    /// Resources to send and names to remove so the client matches
    /// `resources`.
    fn diff<'a>(
        &self,
        resources: impl Iterator<Item = &'a StoredResource>,
    ) -> (Vec<StoredResource>, Vec<String>) {
        let mut updated = Vec::new();
        let mut present = BTreeSet::new();

        for resource in resources {
            if !self.is_subscribed(resource.name()) {
                continue;
            }
            present.insert(resource.name());
            let version = resource.version_string();
            if self.client_version(resource.name()) != Some(version.as_str()) {
                updated.push(resource.clone());
            }
        }

        let removed = self
            .known
            .keys()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect();

        (updated, removed)
    }
}

/// An outstanding delta push.
#[derive(Debug)]
struct InFlight {
    version: ResourceVersion,
    nonce: String,
    updated: Vec<(String, String)>,
    removed: Vec<String>,
}

/// A delta response the session wants sent.
#[derive(Debug, Clone)]
pub struct DeltaPush {
    /// Kind being pushed.
    pub kind: ResourceKind,
    /// Kind version, sent as `system_version_info`.
    pub version: ResourceVersion,
    /// Response nonce.
    pub nonce: String,
    /// Added or changed resources.
    pub resources: Vec<StoredResource>,
    /// Names the client should drop.
    pub removed: Vec<String>,
}

/// Per-kind incremental session.
#[derive(Debug)]
pub struct DeltaSession {
    node: NodeId,
    kind: ResourceKind,
    client: ClientResourceState,
    in_flight: Option<InFlight>,
    acked: Option<ResourceVersion>,
    rejected: Option<ResourceVersion>,
    stale: bool,
    started: bool,
}

impl DeltaSession {
    /// Create a session for `kind` on `node`.
    pub fn new(node: NodeId, kind: ResourceKind) -> Self {
        Self {
            node,
            kind,
            client: ClientResourceState::new(),
            in_flight: None,
            acked: None,
            rejected: None,
            stale: false,
            started: false,
        }
    }

    /// What the client is known to hold.
    pub fn client(&self) -> &ClientResourceState {
        &self.client
    }

    /// Whether a push is outstanding.
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Last kind version the client accepted.
    pub fn acked_version(&self) -> Option<ResourceVersion> {
        self.acked
    }

    /// Last kind version the client rejected.
    pub fn rejected_version(&self) -> Option<ResourceVersion> {
        self.rejected
    }

    /// Feed a client request. Returns the ACK/NACK outcome, if any, and the
    /// push to send, if any.
    pub fn on_request(
        &mut self,
        request: &DeltaDiscoveryRequest,
        snapshot: &Snapshot,
    ) -> (Option<Reply>, Option<DeltaPush>) {
        let mut resubscribed = false;

        if !self.started {
            self.started = true;
            if request.resource_names_subscribe.is_empty() {
                self.client.set_wildcard(true);
            }
            for (name, version) in &request.initial_resource_versions {
                self.client.mark_known(name.clone(), version.clone());
            }
        }

        if !request.resource_names_subscribe.is_empty()
            || !request.resource_names_unsubscribe.is_empty()
        {
            self.client
                .subscribe(request.resource_names_subscribe.iter().cloned());
            self.client
                .unsubscribe(request.resource_names_unsubscribe.iter().cloned());
            debug!(
                node = %self.node,
                kind = %self.kind,
                subscribe = ?request.resource_names_subscribe,
                unsubscribe = ?request.resource_names_unsubscribe,
                "subscription changed"
            );
            resubscribed = true;
        }

        let reply = if request.response_nonce.is_empty() {
            None
        } else {
            Some(self.answer(request))
        };

        if self.in_flight.is_some() {
            self.stale |= resubscribed;
            return (reply, None);
        }

        // Plain requests and subscription changes always re-diff; an answer
        // only does when a change arrived while the push was outstanding.
        let deferred = std::mem::take(&mut self.stale);
        let push = if reply.is_none() || resubscribed || deferred {
            self.offer(snapshot)
        } else {
            None
        };
        (reply, push)
    }

    /// React to a store change for this session's `(node, kind)`.
    pub fn on_change(&mut self, snapshot: &Snapshot) -> Option<DeltaPush> {
        if self.in_flight.is_some() {
            self.stale = true;
            return None;
        }
        self.offer(snapshot)
    }

    fn answer(&mut self, request: &DeltaDiscoveryRequest) -> Reply {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.nonce == request.response_nonce => in_flight,
            other => {
                self.in_flight = other;
                let err = XdsError::StaleAck {
                    type_url: self.kind.type_url().to_string(),
                    nonce: request.response_nonce.clone(),
                };
                debug!(node = %self.node, kind = %self.kind, error = %err, "ignoring answer");
                return Reply::Stale(err);
            }
        };

        match &request.error_detail {
            Some(detail) => {
                let err = XdsError::Rejected {
                    node_id: self.node.to_string(),
                    type_url: self.kind.type_url().to_string(),
                    version: in_flight.version.to_string(),
                    nonce: in_flight.nonce,
                    reason: detail.message.clone(),
                };
                warn!(error = %err, "configuration rejected");
                self.rejected = Some(in_flight.version);
                Reply::Rejected(err)
            }
            None => {
                for (name, version) in in_flight.updated {
                    if self.client.is_subscribed(&name) {
                        self.client.mark_known(name, version);
                    }
                }
                self.client.mark_removed(&in_flight.removed);
                debug!(node = %self.node, kind = %self.kind, version = %in_flight.version, "acked");
                self.acked = Some(in_flight.version);
                Reply::Accepted(in_flight.version)
            }
        }
    }

    fn offer(&mut self, snapshot: &Snapshot) -> Option<DeltaPush> {
        let current = snapshot.kind_version(self.kind);
        if current.is_empty() {
            trace!(node = %self.node, kind = %self.kind, "kind not written yet");
            return None;
        }
        if self.rejected == Some(current) {
            debug!(
                node = %self.node,
                kind = %self.kind,
                version = %current,
                "version was rejected, waiting for a newer one"
            );
            return None;
        }

        let (resources, removed) = match snapshot.get_resources(self.kind) {
            Some(r) => self.client.diff(r.iter()),
            None => self.client.diff(std::iter::empty()),
        };
        if resources.is_empty() && removed.is_empty() {
            trace!(node = %self.node, kind = %self.kind, version = %current, "client up to date");
            return None;
        }

        let nonce = generate_nonce(NoncePrefix::Delta);
        debug!(
            node = %self.node,
            kind = %self.kind,
            version = %current,
            nonce = %nonce,
            updates = resources.len(),
            removals = removed.len(),
            "offering delta"
        );

        self.in_flight = Some(InFlight {
            version: current,
            nonce: nonce.clone(),
            updated: resources
                .iter()
                .map(|r| (r.name().to_string(), r.version_string()))
                .collect(),
            removed: removed.clone(),
        });

        Some(DeltaPush {
            kind: self.kind,
            version: current,
            nonce,
            resources,
            removed,
        })
    }
}

/// One incremental stream.
#[derive(Debug)]
pub struct DeltaConnection {
    cache: Arc<ShardedCache>,
    config: Arc<ServerConfig>,
    metrics: XdsMetrics,
    shutdown: ShutdownController,
    ctx: StreamContext,
    sessions: HashMap<ResourceKind, DeltaSession>,
    watches: WatchSet,
    notifications: StreamMap<ResourceKind, ReceiverStream<ChangeNotification>>,
}

impl DeltaConnection {
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

    /// Drive the stream; see [`crate::sotw::SotwConnection::run`].
    pub async fn run<S>(
        mut self,
        mut requests: S,
        tx: mpsc::Sender<Result<DeltaDiscoveryResponse, Status>>,
    ) where
        S: Stream<Item = Result<DeltaDiscoveryRequest, Status>> + Unpin + Send,
    {
        let _operation = self.shutdown.register_operation();
        let _tracker = StreamTracker::new(self.metrics.clone(), PROTOCOL);
        let shutdown = self.shutdown.shutdown_signal().wait();
        tokio::pin!(shutdown);

        info!("delta stream started");

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
                            warn!(error = %e, "refusing delta stream");
                            self.metrics.record_refused_stream(PROTOCOL);
                            let _ = tx.send(Err(e.into())).await;
                            break;
                        }
                    },
                    Some(Err(status)) => {
                        debug!(status = %status, "delta stream error");
                        break;
                    }
                    None => {
                        debug!("client closed delta stream");
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
            "delta stream ended"
        );

        // Cancel watches before the response channel closes.
        drop(self);
    }

    fn handle_request(
        &mut self,
        request: DeltaDiscoveryRequest,
    ) -> XdsResult<Option<DeltaDiscoveryResponse>> {
        self.ctx.record_request();
        let node = bind_node(&mut self.ctx, request.node.as_ref(), &self.cache, &self.config)?;

        let Some(kind) = ResourceKind::from_type_url(&request.type_url) else {
            warn!(type_url = %request.type_url, "ignoring delta request for unknown type");
            self.metrics.record_unknown_type();
            return Ok(None);
        };
        self.metrics.record_request(kind);

        trace!(
            kind = %kind,
            nonce = %request.response_nonce,
            subscribe = ?request.resource_names_subscribe,
            unsubscribe = ?request.resource_names_unsubscribe,
            "processing delta request"
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
            .or_insert_with(|| DeltaSession::new(node.clone(), kind));

        let snapshot = self.cache.build(&node);
        let (reply, push) = session.on_request(&request, &snapshot);

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
    ) -> Option<DeltaDiscoveryResponse> {
        trace!(kind = %kind, version = %notification.version, "store changed");
        let session = self.sessions.get_mut(&kind)?;
        let snapshot = self.cache.build(&notification.node);
        let push = session.on_change(&snapshot)?;
        Some(self.respond(push))
    }

    fn respond(&mut self, push: DeltaPush) -> DeltaDiscoveryResponse {
        self.ctx.record_response();
        self.metrics.record_push(push.kind, push.resources.len());

        info!(
            kind = %push.kind,
            version = %push.version,
            nonce = %push.nonce,
            updates = push.resources.len(),
            removals = push.removed.len(),
            "sending delta response"
        );

        DeltaDiscoveryResponse {
            system_version_info: push.version.to_string(),
            resources: push
                .resources
                .iter()
                .map(|r| Resource {
                    version: r.version_string(),
                    resource: Some(r.encoded().clone()),
                    name: r.name().to_string(),
                    aliases: Vec::new(),
                })
                .collect(),
            type_url: push.kind.type_url().to_string(),
            nonce: push.nonce,
            removed_resources: push.removed,
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
