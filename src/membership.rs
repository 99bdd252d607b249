//! Room → member-connection registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::protocol::ConnectionId;

/// Maps each room identifier to the connections currently joined.
///
/// Rooms are lazily materialized on first join and never deleted: a
/// membership list may shrink to empty but the room entry stays, so a
/// prune can never race a concurrent join.
///
/// Member lists keep insertion order, so `members_of` snapshots are
/// ordered by join recency. The ordering is deterministic within one
/// snapshot but carries no further meaning. Duplicate entries are
/// prevented by [`add_member`](Self::add_member), not by the container.
#[derive(Clone, Default)]
pub struct RoomMembership {
    rooms: Arc<RwLock<HashMap<String, Vec<ConnectionId>>>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if absent.
    ///
    /// Calling twice for the same pair does not produce a duplicate entry.
    pub async fn add_member(&self, room: &str, conn: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.to_string()).or_default();
        if !members.contains(&conn) {
            members.push(conn);
        }
    }

    /// Add a connection to a room unless the room already holds `cap`
    /// members.
    ///
    /// The check and the insert happen under one write lock, so two
    /// concurrent joins cannot both slip past the cap. An existing member
    /// always passes (a rejoin is not a second seat), and a rejected join
    /// does not materialize the room.
    pub async fn add_member_capped(&self, room: &str, conn: ConnectionId, cap: usize) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            if members.contains(&conn) {
                return true;
            }
            if members.len() >= cap {
                return false;
            }
            members.push(conn);
            return true;
        }
        if cap == 0 {
            return false;
        }
        rooms.insert(room.to_string(), vec![conn]);
        true
    }

    /// Remove a connection from a room.
    ///
    /// No-op when the room or the membership is absent. The room entry
    /// itself is kept even when its list becomes empty.
    pub async fn remove_member(&self, room: &str, conn: ConnectionId) {
        if let Some(members) = self.rooms.write().await.get_mut(room) {
            members.retain(|c| *c != conn);
        }
    }

    /// Point-in-time snapshot of a room's members, ordered by join recency.
    ///
    /// An unknown room yields an empty snapshot.
    pub async fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .read()
            .await
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    /// Every room whose membership currently contains `conn`.
    ///
    /// Used during disconnect cleanup.
    pub async fn rooms_containing(&self, conn: ConnectionId) -> Vec<String> {
        self.rooms
            .read()
            .await
            .iter()
            .filter(|(_, members)| members.contains(&conn))
            .map(|(room, _)| room.clone())
            .collect()
    }

    /// Number of materialized rooms (including empty ones).
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
