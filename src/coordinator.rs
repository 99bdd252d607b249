//! Orchestration of the join / change / sync / disconnect operations.

use crate::identity::IdentityRegistry;
use crate::membership::RoomMembership;
use crate::presence::PresenceView;
use crate::protocol::{ConnectionId, ServerEvent};
use crate::router::BroadcastRouter;

/// Ties the registries and the router together behind the four session
/// operations and their ordering contracts.
///
/// Per connection the lifecycle is `Unjoined → JoinedRoom(room)* →
/// Disconnected`: a second join with a different room id adds a membership
/// rather than replacing one, and only a full disconnect removes
/// memberships. There is no leave-room operation.
///
/// The coordinator is presence-only: document content passes through it on
/// the way to peers but is never stored.
#[derive(Clone)]
pub struct SessionCoordinator {
    identities: IdentityRegistry,
    membership: RoomMembership,
    presence: PresenceView,
    router: BroadcastRouter,
    max_members_per_room: usize,
}

impl SessionCoordinator {
    pub fn new(
        identities: IdentityRegistry,
        membership: RoomMembership,
        router: BroadcastRouter,
        max_members_per_room: usize,
    ) -> Self {
        let presence = PresenceView::new(identities.clone(), membership.clone());
        Self {
            identities,
            membership,
            presence,
            router,
            max_members_per_room,
        }
    }

    /// Handle a join: admit the connection if the room has a free seat,
    /// record membership and identity, then announce the updated view to
    /// every room member, the joiner included.
    ///
    /// Returns whether the join was admitted. A rejected join mutates
    /// nothing, not even the identity, so a peer already present in other
    /// rooms keeps its current name there.
    pub async fn join(&self, conn: ConnectionId, room: &str, username: &str) -> bool {
        if !self
            .membership
            .add_member_capped(room, conn, self.max_members_per_room)
            .await
        {
            log::warn!(
                "{username} ({conn}) rejected from room {room}: at capacity ({})",
                self.max_members_per_room
            );
            return false;
        }
        self.identities.set(conn, username).await;

        let view = self.presence.compute_view(room).await;
        log::info!("{username} ({conn}) joined room {room} ({} members)", view.len());

        self.router
            .send_to_room(
                room,
                &ServerEvent::UserJoined {
                    view,
                    username: username.to_string(),
                    connection: conn,
                },
            )
            .await;
        true
    }

    /// Fan a content change out to the whole room.
    ///
    /// Pure fan-out: mutates no registry state. No ordering guarantee
    /// against a concurrent join's announcement from another connection.
    pub async fn broadcast_change(&self, room: &str, content: &str) {
        self.router
            .send_to_room(
                room,
                &ServerEvent::ContentChanged {
                    content: content.to_string(),
                },
            )
            .await;
    }

    /// Push authoritative content directly to one newly joined peer.
    ///
    /// Pure fan-out, bypassing the room. This is how a new joiner receives
    /// document state: an existing peer relays it, the server keeps none.
    pub async fn targeted_sync(&self, target: ConnectionId, content: &str) {
        self.router
            .send_to_connection(
                target,
                &ServerEvent::SyncContent {
                    content: content.to_string(),
                },
            )
            .await;
    }

    /// Clean up after a transport loss.
    ///
    /// Captures the identity first; if it is already gone the connection
    /// was cleaned up before and nothing further happens. Otherwise every
    /// room containing the connection is notified and then pruned of it,
    /// one room at a time with no cross-room transaction. A sweep interrupted
    /// midway leaves stale memberships that later view computations skip.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let Some(username) = self.identities.remove(conn).await else {
            log::debug!("Disconnect for {conn}: already cleaned up");
            return;
        };

        let rooms = self.membership.rooms_containing(conn).await;
        log::info!("{username} ({conn}) disconnected from {} room(s)", rooms.len());

        for room in rooms {
            self.router
                .send_to_room(
                    &room,
                    &ServerEvent::UserLeft {
                        connection: conn,
                        username: username.clone(),
                    },
                )
                .await;
            self.membership.remove_member(&room, conn).await;
        }
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn membership(&self) -> &RoomMembership {
        &self.membership
    }

    pub fn presence(&self) -> &PresenceView {
        &self.presence
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }
}
