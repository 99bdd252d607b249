//! Fire-and-forget event routing to single connections and whole rooms.
//!
//! Each live connection registers a bounded outbound channel; room fan-out
//! encodes the event once and delivers the same bytes independently to
//! every member of the room's current membership snapshot. At-most-once,
//! no retry, no acknowledgment: a closed, full, or lagging peer simply
//! misses the event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::membership::RoomMembership;
use crate::protocol::{ConnectionId, ServerEvent};

/// Outbound channel handed to the transport task of one connection.
pub type OutboundSender = mpsc::Sender<Arc<Vec<u8>>>;

/// Receiving half pumped into the WebSocket by the connection task.
pub type OutboundReceiver = mpsc::Receiver<Arc<Vec<u8>>>;

/// Delivery statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct RouterStats {
    pub events_sent: u64,
    pub events_dropped: u64,
    pub registered_connections: usize,
}

/// Atomic counters, lock-free on the send path.
struct AtomicRouterStats {
    events_sent: AtomicU64,
    events_dropped: AtomicU64,
}

impl AtomicRouterStats {
    fn new() -> Self {
        Self {
            events_sent: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }
}

/// Delivers [`ServerEvent`]s to one addressed connection or to every member
/// of a room.
///
/// Delivery failure (target already unregistered, receiver dropped) is
/// silent from the caller's perspective; partial delivery across a room is
/// an accepted outcome, not a failure to report.
#[derive(Clone)]
pub struct BroadcastRouter {
    senders: Arc<RwLock<HashMap<ConnectionId, OutboundSender>>>,
    membership: RoomMembership,
    stats: Arc<AtomicRouterStats>,
    channel_capacity: usize,
}

impl BroadcastRouter {
    pub fn new(membership: RoomMembership, channel_capacity: usize) -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
            membership,
            stats: Arc::new(AtomicRouterStats::new()),
            channel_capacity,
        }
    }

    /// Register a connection's outbound channel.
    ///
    /// Returns the receiving half for the connection task to pump into its
    /// socket. Registering the same connection again replaces the channel.
    pub async fn register(&self, conn: ConnectionId) -> OutboundReceiver {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.senders.write().await.insert(conn, tx);
        rx
    }

    /// Drop a connection's outbound channel. Later sends to it are dropped.
    pub async fn unregister(&self, conn: ConnectionId) {
        self.senders.write().await.remove(&conn);
    }

    /// Deliver one event to exactly one addressed connection.
    ///
    /// Fire-and-forget: an unreachable or backed-up target only bumps the
    /// drop counter.
    pub async fn send_to_connection(&self, conn: ConnectionId, event: &ServerEvent) {
        let encoded = match event.encode() {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                log::warn!("Failed to encode event for {conn}: {e}");
                return;
            }
        };
        self.deliver(conn, encoded, &*self.senders.read().await);
    }

    /// Deliver the same event independently to every member of the room's
    /// current membership snapshot.
    ///
    /// The event is encoded once and the bytes shared across recipients.
    /// Returns the number of members the event was handed to; the rest were
    /// dropped (disconnected mid-fanout or never registered).
    pub async fn send_to_room(&self, room: &str, event: &ServerEvent) -> usize {
        let members = self.membership.members_of(room).await;
        if members.is_empty() {
            return 0;
        }

        let encoded = match event.encode() {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                log::warn!("Failed to encode event for room {room}: {e}");
                return 0;
            }
        };

        let senders = self.senders.read().await;
        let mut delivered = 0;
        for conn in members {
            if self.deliver(conn, encoded.clone(), &senders) {
                delivered += 1;
            }
        }
        log::trace!("Fan-out to room {room}: {delivered} delivered");
        delivered
    }

    fn deliver(
        &self,
        conn: ConnectionId,
        encoded: Arc<Vec<u8>>,
        senders: &HashMap<ConnectionId, OutboundSender>,
    ) -> bool {
        // try_send so a full channel drops the event rather than blocking
        // the fan-out behind one slow peer.
        let delivered = senders
            .get(&conn)
            .is_some_and(|tx| tx.try_send(encoded).is_ok());
        if delivered {
            self.stats.events_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Whether a connection currently has a registered channel.
    pub async fn is_registered(&self, conn: ConnectionId) -> bool {
        self.senders.read().await.contains_key(&conn)
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }

    /// Statistics snapshot.
    pub async fn stats(&self) -> RouterStats {
        RouterStats {
            events_sent: self.stats.events_sent.load(Ordering::Relaxed),
            events_dropped: self.stats.events_dropped.load(Ordering::Relaxed),
            registered_connections: self.senders.read().await.len(),
        }
    }
}
