//! On-demand presence views over the identity and membership registries.

use crate::identity::IdentityRegistry;
use crate::membership::RoomMembership;
use crate::protocol::ParticipantInfo;

/// Derives the ordered `(connection, username)` list for a room.
///
/// A pure read over the two backing registries at the instant it runs; it
/// never mutates state and is not atomic with respect to concurrent
/// membership changes. Because the registries have no cross-registry
/// transaction, a member whose identity was already removed by a racing
/// disconnect is skipped (and logged) rather than erroring; the next view
/// computation self-heals.
#[derive(Clone)]
pub struct PresenceView {
    identities: IdentityRegistry,
    membership: RoomMembership,
}

impl PresenceView {
    pub fn new(identities: IdentityRegistry, membership: RoomMembership) -> Self {
        Self {
            identities,
            membership,
        }
    }

    /// Compute the view for `room`, ordered like the membership snapshot.
    pub async fn compute_view(&self, room: &str) -> Vec<ParticipantInfo> {
        let members = self.membership.members_of(room).await;
        let mut view = Vec::with_capacity(members.len());

        for conn in members {
            match self.identities.get(conn).await {
                Some(username) => view.push(ParticipantInfo::new(conn, username)),
                None => {
                    // Transient: membership observed before the disconnect
                    // sweep reached this room.
                    log::debug!("Skipping {conn} in view of room {room}: identity already removed");
                }
            }
        }

        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionId;

    fn fixture() -> (IdentityRegistry, RoomMembership, PresenceView) {
        let identities = IdentityRegistry::new();
        let membership = RoomMembership::new();
        let view = PresenceView::new(identities.clone(), membership.clone());
        (identities, membership, view)
    }

    #[tokio::test]
    async fn test_view_pairs_members_with_identities() {
        let (identities, membership, view) = fixture();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        identities.set(a, "alice").await;
        identities.set(b, "bob").await;
        membership.add_member("r1", a).await;
        membership.add_member("r1", b).await;

        let computed = view.compute_view("r1").await;
        assert_eq!(
            computed,
            vec![
                ParticipantInfo::new(a, "alice"),
                ParticipantInfo::new(b, "bob"),
            ]
        );
    }

    #[tokio::test]
    async fn test_view_reflects_latest_identity() {
        let (identities, membership, view) = fixture();
        let a = ConnectionId::new();

        identities.set(a, "alice").await;
        membership.add_member("r1", a).await;
        identities.set(a, "alice-renamed").await;

        let computed = view.compute_view("r1").await;
        assert_eq!(computed[0].username, "alice-renamed");
    }

    #[tokio::test]
    async fn test_view_skips_missing_identity() {
        let (identities, membership, view) = fixture();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        identities.set(a, "alice").await;
        // b is in the room but its identity is already gone, as happens
        // mid-disconnect-sweep.
        membership.add_member("r1", a).await;
        membership.add_member("r1", b).await;

        let computed = view.compute_view("r1").await;
        assert_eq!(computed, vec![ParticipantInfo::new(a, "alice")]);
    }

    #[tokio::test]
    async fn test_view_of_unknown_room_is_empty() {
        let (_, _, view) = fixture();
        assert!(view.compute_view("nowhere").await.is_empty());
    }

    #[tokio::test]
    async fn test_view_never_mutates() {
        let (identities, membership, view) = fixture();
        let a = ConnectionId::new();

        identities.set(a, "alice").await;
        membership.add_member("r1", a).await;

        let _ = view.compute_view("r1").await;
        let _ = view.compute_view("r1").await;

        assert_eq!(identities.len().await, 1);
        assert_eq!(membership.members_of("r1").await, vec![a]);
    }
}
