//! State-of-the-world discovery session.
//!
//! One [`SotwSession`] tracks one proxy's progress on one resource kind. It
//! moves between three states:
//!
//! ```text
//! Subscribed --push--> Pending --ACK--> Acked --push--> Pending ...
//!                         |
//!                         +--NACK--> Acked (previous) or Subscribed
//! ```
//!
//! A rejected version is remembered and never offered again. At most one push
//! is outstanding; a newer version that shows up meanwhile marks the session
//! stale and is offered once the outstanding push is answered. Offered
//! versions only ever grow.
//!
//! Once the latest response is answered, later requests carry the same
//! nonce. Those are subscription updates: a changed name list re-offers the
//! current version. Only nonces older than the latest response are stale.

use tracing::{debug, trace, warn};
use xds_cache::Snapshot;
use xds_core::{NodeId, ResourceKind, ResourceVersion, StoredResource, XdsError};
use xds_types::envoy::service::discovery::v3::DiscoveryRequest;

use crate::stream::{generate_nonce, NoncePrefix};

/// Protocol state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Subscribed, nothing accepted yet and nothing outstanding.
    Subscribed,
    /// A push is outstanding.
    Pending {
        /// Offered version.
        version: ResourceVersion,
        /// Nonce of the outstanding response.
        nonce: String,
    },
    /// The client accepted `version`.
    Acked {
        /// Accepted version.
        version: ResourceVersion,
    },
}

/// A response the session wants sent.
#[derive(Debug, Clone)]
pub struct Push {
    /// Kind being pushed.
    pub kind: ResourceKind,
    /// Kind version.
    pub version: ResourceVersion,
    /// Response nonce.
    pub nonce: String,
    /// Resources in name order.
    pub resources: Vec<StoredResource>,
}

/// How the session interpreted the ACK/NACK part of a request.
#[derive(Debug)]
pub enum Reply {
    /// The outstanding push was accepted.
    Accepted(ResourceVersion),
    /// The outstanding push was rejected ([`XdsError::Rejected`]).
    Rejected(XdsError),
    /// The request answered a nonce that is not outstanding
    /// ([`XdsError::StaleAck`]); it was ignored.
    Stale(XdsError),
}

/// Result of feeding one request to a session.
#[derive(Debug, Default)]
pub struct Step {
    /// ACK/NACK outcome, if the request answered a push.
    pub reply: Option<Reply>,
    /// Response to send, if any.
    pub push: Option<Push>,
}

/// Per-kind state-of-the-world session.
#[derive(Debug)]
pub struct SotwSession {
    node: NodeId,
    kind: ResourceKind,
    state: SessionState,
    acked: Option<ResourceVersion>,
    rejected: Option<ResourceVersion>,
    last_offered: ResourceVersion,
    /// A newer version arrived while a push was outstanding.
    stale: bool,
    /// The name list changed while a push was outstanding.
    names_dirty: bool,
    /// Nonce of the latest response.
    last_nonce: Option<String>,
    resource_names: Vec<String>,
    started: bool,
}

impl SotwSession {
    /// Create a session for `kind` on `node`.
    pub fn new(node: NodeId, kind: ResourceKind) -> Self {
        Self {
            node,
            kind,
            state: SessionState::Subscribed,
            acked: None,
            rejected: None,
            last_offered: ResourceVersion::ZERO,
            stale: false,
            names_dirty: false,
            last_nonce: None,
            resource_names: Vec::new(),
            started: false,
        }
    }

    /// Resource kind of this session.
    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Last version the client accepted.
    #[inline]
    pub fn acked_version(&self) -> Option<ResourceVersion> {
        self.acked
    }

    /// Last version the client rejected.
    #[inline]
    pub fn rejected_version(&self) -> Option<ResourceVersion> {
        self.rejected
    }

    /// Highest version offered on this session.
    #[inline]
    pub fn last_offered(&self) -> ResourceVersion {
        self.last_offered
    }

    /// Requested names; empty means all.
    #[inline]
    pub fn resource_names(&self) -> &[String] {
        &self.resource_names
    }

    /// Feed a client request.
    ///
    /// `snapshot` must be freshly built for the session's node.
    pub fn on_request(&mut self, request: &DiscoveryRequest, snapshot: &Snapshot) -> Step {
        if !self.started {
            return self.start(request, snapshot);
        }

        if request.response_nonce.is_empty() {
            return self.resubscribe(request, snapshot);
        }

        let version = match &self.state {
            SessionState::Pending { version, nonce } if *nonce == request.response_nonce => {
                *version
            }
            SessionState::Pending { .. } => return self.stale(request),
            _ => {
                let latest = self.last_nonce.as_deref() == Some(request.response_nonce.as_str());
                return if latest {
                    self.resubscribe(request, snapshot)
                } else {
                    self.stale(request)
                };
            }
        };

        let reply = match &request.error_detail {
            Some(detail) => {
                let err = XdsError::Rejected {
                    node_id: self.node.to_string(),
                    type_url: self.kind.type_url().to_string(),
                    version: version.to_string(),
                    nonce: request.response_nonce.clone(),
                    reason: detail.message.clone(),
                };
                warn!(error = %err, "configuration rejected");
                self.rejected = Some(version);
                self.state = match self.acked {
                    Some(version) => SessionState::Acked { version },
                    None => SessionState::Subscribed,
                };
                Reply::Rejected(err)
            }
            None => {
                debug!(node = %self.node, kind = %self.kind, version = %version, "acked");
                self.acked = Some(version);
                self.state = SessionState::Acked { version };
                Reply::Accepted(version)
            }
        };

        let force = self.update_names(&request.resource_names) | std::mem::take(&mut self.names_dirty);
        let push = if std::mem::take(&mut self.stale) || force {
            self.offer(snapshot, force)
        } else {
            None
        };

        Step {
            reply: Some(reply),
            push,
        }
    }

    /// React to a store change for this session's `(node, kind)`.
    pub fn on_change(&mut self, snapshot: &Snapshot) -> Option<Push> {
        self.offer(snapshot, false)
    }

    fn start(&mut self, request: &DiscoveryRequest, snapshot: &Snapshot) -> Step {
        self.started = true;
        self.resource_names = request.resource_names.clone();

        let current = snapshot.kind_version(self.kind);
        if !current.is_empty() && ResourceVersion::parse(&request.version_info) == Some(current) {
            debug!(
                node = %self.node,
                kind = %self.kind,
                version = %current,
                "client resumed at current version"
            );
            self.acked = Some(current);
            self.last_offered = current;
            self.state = SessionState::Acked { version: current };
            return Step::default();
        }

        Step {
            reply: None,
            push: self.offer(snapshot, false),
        }
    }

    /// Handle a request that answers nothing outstanding.
    fn resubscribe(&mut self, request: &DiscoveryRequest, snapshot: &Snapshot) -> Step {
        let changed = self.update_names(&request.resource_names);
        Step {
            reply: None,
            push: self.offer(snapshot, changed),
        }
    }

    fn stale(&self, request: &DiscoveryRequest) -> Step {
        let err = XdsError::StaleAck {
            type_url: self.kind.type_url().to_string(),
            nonce: request.response_nonce.clone(),
        };
        debug!(node = %self.node, kind = %self.kind, error = %err, "ignoring request");
        Step {
            reply: Some(Reply::Stale(err)),
            push: None,
        }
    }

    fn update_names(&mut self, names: &[String]) -> bool {
        if self.resource_names == names {
            return false;
        }
        debug!(node = %self.node, kind = %self.kind, names = ?names, "subscription changed");
        self.resource_names = names.to_vec();
        true
    }

    /// Offer the current version if the client should get it.
    ///
    /// `resend` allows re-offering the last offered version, for a changed
    /// name list.
    fn offer(&mut self, snapshot: &Snapshot, resend: bool) -> Option<Push> {
        let current = snapshot.kind_version(self.kind);
        if current.is_empty() {
            trace!(node = %self.node, kind = %self.kind, "kind not written yet");
            return None;
        }

        if let SessionState::Pending { version, .. } = &self.state {
            if current > *version {
                self.stale = true;
            }
            if resend {
                self.names_dirty = true;
            }
            trace!(node = %self.node, kind = %self.kind, "push outstanding, deferring");
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

        let redundant = if resend {
            current < self.last_offered
        } else {
            self.acked == Some(current) || current <= self.last_offered
        };
        if redundant {
            trace!(node = %self.node, kind = %self.kind, version = %current, "nothing new");
            return None;
        }

        let resources: Vec<StoredResource> = snapshot
            .get_resources(self.kind)
            .map(|r| r.select(&self.resource_names).cloned().collect())
            .unwrap_or_default();
        let nonce = generate_nonce(NoncePrefix::SotW);

        debug!(
            node = %self.node,
            kind = %self.kind,
            version = %current,
            nonce = %nonce,
            count = resources.len(),
            "offering version"
        );

        self.state = SessionState::Pending {
            version: current,
            nonce: nonce.clone(),
        };
        self.last_offered = current;
        self.last_nonce = Some(nonce.clone());

        Some(Push {
            kind: self.kind,
            version: current,
            nonce,
            resources,
        })
    }
}
