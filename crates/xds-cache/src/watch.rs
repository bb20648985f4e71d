//! Watch system for cache change notifications.
//!
//! The watch system provides:
//! - Unique watch identifiers ([`WatchId`])
//! - Watch subscriptions ([`Watch`]) keyed by `(node, kind)`
//! - Watch management ([`WatchManager`]) for fan-out to many subscriptions
//!
//! A notification only says "this group changed, now at this version". It
//! carries no resources: receivers rebuild a snapshot from the store, so a
//! dropped notification is harmless as long as a later one arrives.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use xds_core::{NodeId, ResourceKind, ResourceVersion, XdsError, XdsResult};

/// Unique identifier for a watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    /// Create a new unique watch ID.
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value of this watch ID.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// A change to one `(node, kind)` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Node whose resources changed.
    pub node: NodeId,
    /// Kind that changed.
    pub kind: ResourceKind,
    /// Kind version after the change.
    pub version: ResourceVersion,
}

/// A watch subscription for receiving change notifications.
#[derive(Debug)]
pub struct Watch {
    /// Unique identifier for this watch.
    id: WatchId,
    /// Node this watch is subscribed to.
    node: NodeId,
    /// Kind this watch is subscribed to.
    kind: ResourceKind,
    /// Receiver for notifications.
    receiver: mpsc::Receiver<ChangeNotification>,
}

impl Watch {
    /// Get the unique identifier for this watch.
    #[inline]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Get the node this watch is subscribed to.
    #[inline]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Get the kind this watch is subscribed to.
    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Receive the next notification.
    ///
    /// Returns `None` if the watch has been cancelled.
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.receiver.recv().await
    }

    /// Try to receive a notification without waiting.
    pub fn try_recv(&mut self) -> Result<ChangeNotification, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Split off the receiver, e.g. to wrap it in a stream.
    pub fn into_receiver(self) -> mpsc::Receiver<ChangeNotification> {
        self.receiver
    }
}

/// Sender half of a watch, used internally to send notifications.
#[derive(Debug, Clone)]
pub(crate) struct WatchSender {
    id: WatchId,
    sender: mpsc::Sender<ChangeNotification>,
}

impl WatchSender {
    /// Try to send a notification.
    ///
    /// Uses `try_send` to avoid blocking. If the channel is full,
    /// the notification is dropped (the receiver already has one pending).
    pub fn try_send(&self, notification: ChangeNotification) -> XdsResult<bool> {
        match self.sender.try_send(notification) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(watch_id = %self.id, "watch channel full, skipping notification");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(XdsError::WatchClosed {
                watch_id: self.id.0,
            }),
        }
    }
}

/// Manager for watch subscriptions.
///
/// Handles creating, tracking, and cancelling watches. Senders are stored
/// per `(node, kind)` in a `DashMap`; no shard lock is held while sending.
#[derive(Debug)]
pub struct WatchManager {
    /// Active watch senders per group.
    watches: DashMap<(NodeId, ResourceKind), Vec<WatchSender>>,
    /// Channel buffer size for new watches.
    channel_buffer: usize,
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchManager {
    /// Create a new watch manager with default settings.
    pub fn new() -> Self {
        Self::with_buffer_size(16)
    }

    /// Create a new watch manager with a custom channel buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            watches: DashMap::new(),
            channel_buffer: buffer_size.max(1),
        }
    }

    /// Create a new watch for a `(node, kind)` group.
    pub fn create_watch(&self, node: NodeId, kind: ResourceKind) -> Watch {
        let id = WatchId::next();
        let (sender, receiver) = mpsc::channel(self.channel_buffer);

        self.watches
            .entry((node.clone(), kind))
            .or_default()
            .push(WatchSender { id, sender });

        debug!(watch_id = %id, node = %node, kind = %kind, "created watch");

        Watch {
            id,
            node,
            kind,
            receiver,
        }
    }

    /// Cancel a watch subscription.
    ///
    /// The watch will no longer receive notifications. Returns the node of
    /// the group if this was its last watch.
    pub fn cancel_watch(&self, watch_id: WatchId) -> Option<NodeId> {
        let mut emptied = None;
        for mut entry in self.watches.iter_mut() {
            if let Some(pos) = entry.value().iter().position(|s| s.id == watch_id) {
                entry.value_mut().swap_remove(pos);
                if entry.value().is_empty() {
                    emptied = Some(entry.key().clone());
                }
                debug!(watch_id = %watch_id, "cancelled watch");
                break;
            }
        }
        let (node, kind) = emptied?;
        self.watches
            .remove_if(&(node, kind), |_, senders| senders.is_empty())
            .map(|((node, _), _)| node)
    }

    /// Notify all watches of a `(node, kind)` group.
    ///
    /// Removes any closed watches automatically. Returns the number of
    /// notifications delivered.
    pub fn notify(&self, node: &NodeId, kind: ResourceKind, version: ResourceVersion) -> u64 {
        let key = (node.clone(), kind);

        // Clone senders so no shard lock is held while sending
        let senders: Vec<WatchSender> = match self.watches.get(&key) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for sender in &senders {
            let notification = ChangeNotification {
                node: node.clone(),
                kind,
                version,
            };
            match sender.try_send(notification) {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(_) => closed.push(sender.id),
            }
        }

        if !closed.is_empty() {
            if let Some(mut entry) = self.watches.get_mut(&key) {
                entry.value_mut().retain(|s| !closed.contains(&s.id));
            }
            self.watches.remove_if(&key, |_, senders| senders.is_empty());
            debug!(count = closed.len(), "removed closed watches");
        }

        trace!(node = %node, kind = %kind, version = %version, delivered, "notified watches");
        delivered
    }

    /// Get the number of active watches for a group.
    pub fn watch_count(&self, node: &NodeId, kind: ResourceKind) -> usize {
        self.watches
            .get(&(node.clone(), kind))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Check whether any group of a node has an active watch.
    pub fn has_watches(&self, node: &NodeId) -> bool {
        ResourceKind::ALL
            .into_iter()
            .any(|kind| self.watch_count(node, kind) > 0)
    }

    /// Get the total number of active watches across all groups.
    pub fn total_watch_count(&self) -> usize {
        self.watches.iter().map(|v| v.len()).sum()
    }
}
