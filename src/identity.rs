//! Connection → display-name registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::protocol::ConnectionId;

/// Maps each live connection to the display name it chose at join time.
///
/// One identity per connection; a repeat join overwrites it, no history is
/// kept. Safe for concurrent use; independent of [`RoomMembership`], so a
/// reader may observe one registry updated before the other
/// (see [`PresenceView`]).
///
/// [`RoomMembership`]: crate::membership::RoomMembership
/// [`PresenceView`]: crate::presence::PresenceView
#[derive(Clone, Default)]
pub struct IdentityRegistry {
    names: Arc<RwLock<HashMap<ConnectionId, String>>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional upsert. Later reads of `conn` return `name`.
    pub async fn set(&self, conn: ConnectionId, name: impl Into<String>) {
        self.names.write().await.insert(conn, name.into());
    }

    /// Remove the identity, returning the previously stored name.
    ///
    /// Idempotent: a second call returns `None`, it is not an error.
    pub async fn remove(&self, conn: ConnectionId) -> Option<String> {
        self.names.write().await.remove(&conn)
    }

    /// Look up the stored name.
    pub async fn get(&self, conn: ConnectionId) -> Option<String> {
        self.names.read().await.get(&conn).cloned()
    }

    /// Number of registered identities.
    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.names.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let registry = IdentityRegistry::new();
        let conn = ConnectionId::new();

        registry.set(conn, "alice").await;
        assert_eq!(registry.get(conn).await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let registry = IdentityRegistry::new();
        let conn = ConnectionId::new();

        registry.set(conn, "alice").await;
        registry.set(conn, "alice2").await;
        assert_eq!(registry.get(conn).await.as_deref(), Some("alice2"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.get(ConnectionId::new()).await, None);
    }

    #[tokio::test]
    async fn test_remove_returns_prior_name() {
        let registry = IdentityRegistry::new();
        let conn = ConnectionId::new();

        registry.set(conn, "bob").await;
        assert_eq!(registry.remove(conn).await.as_deref(), Some("bob"));
        assert_eq!(registry.get(conn).await, None);
    }

    #[tokio::test]
    async fn test_remove_idempotent() {
        let registry = IdentityRegistry::new();
        let conn = ConnectionId::new();

        registry.set(conn, "bob").await;
        assert!(registry.remove(conn).await.is_some());
        // Second removal reports not-found, not an error.
        assert!(registry.remove(conn).await.is_none());
    }
}
