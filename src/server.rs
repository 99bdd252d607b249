//! WebSocket server wiring connections into the session coordinator.
//!
//! Architecture:
//! ```text
//! Client A ──┐                    ┌── IdentityRegistry
//!             ├── CollabServer ───┤
//! Client B ──┘        │           └── RoomMembership
//!                     ▼                    │
//!             SessionCoordinator ── PresenceView
//!                     │
//!              BroadcastRouter
//!                     │
//!          ┌──────────┼──────────┐
//!          ▼          ▼          ▼
//!       Client A   Client B   Client C
//! ```
//!
//! One task per connection: a `select!` loop over inbound frames and the
//! connection's outbound channel. The server holds no document content;
//! it is presence and routing only.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::coordinator::SessionCoordinator;
use crate::identity::IdentityRegistry;
use crate::membership::RoomMembership;
use crate::protocol::{ClientRequest, ConnectionId, ServerEvent};
use crate::router::BroadcastRouter;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Outbound channel capacity per connection
    pub channel_capacity: usize,
    /// Maximum members per room
    pub max_members_per_room: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            channel_capacity: 256,
            max_members_per_room: 100,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_requests: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// The presence/broadcast server.
pub struct CollabServer {
    config: ServerConfig,
    coordinator: SessionCoordinator,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    /// Create a new server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let identities = IdentityRegistry::new();
        let membership = RoomMembership::new();
        let router = BroadcastRouter::new(membership.clone(), config.channel_capacity);
        let coordinator = SessionCoordinator::new(
            identities,
            membership,
            router,
            config.max_members_per_room,
        );

        Self {
            config,
            coordinator,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the accept loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Collab server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let coordinator = self.coordinator.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, coordinator, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection for its whole lifetime.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        coordinator: SessionCoordinator,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let conn = ConnectionId::new();
        log::info!("Connection {conn} established from {addr}");

        // The id is transport-assigned, so the client learns it from us.
        // Registered with the router only after the Welcome goes out; no
        // event can target this connection before its first request anyway.
        let welcome = ServerEvent::Welcome { connection: conn }.encode()?;
        ws_sender.send(Message::Binary(welcome.into())).await?;
        let pong = ServerEvent::Pong.encode()?;

        // Counted only once the handshake has fully succeeded, so every
        // increment is matched by the decrement after the loop.
        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }
        let mut outbound = coordinator.router().register(conn).await;

        // Send failures below break out of the loop instead of returning so
        // the disconnect sweep always runs.
        loop {
            tokio::select! {
                // Inbound WebSocket frame
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            match ClientRequest::decode(&bytes) {
                                Ok(request) => {
                                    {
                                        let mut s = stats.write().await;
                                        s.total_requests += 1;
                                        s.total_bytes += bytes.len() as u64;
                                    }

                                    match request {
                                        ClientRequest::JoinRoom { room, username } => {
                                            if coordinator.join(conn, &room, &username).await {
                                                let room_count =
                                                    coordinator.membership().room_count().await;
                                                let mut s = stats.write().await;
                                                s.active_rooms = room_count;
                                            }
                                        }

                                        ClientRequest::ChangeContent { room, content } => {
                                            coordinator.broadcast_change(&room, &content).await;
                                        }

                                        ClientRequest::SyncContent { target, content } => {
                                            coordinator.targeted_sync(target, &content).await;
                                        }

                                        ClientRequest::Ping => {
                                            if ws_sender
                                                .send(Message::Binary(pong.clone().into()))
                                                .await
                                                .is_err()
                                            {
                                                break;
                                            }
                                        }
                                    }
                                }
                                Err(e) => {
                                    log::warn!("Failed to decode request from {addr}: {e}");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection {conn} closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            if ws_sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outbound routed event
                event = outbound.recv() => {
                    match event {
                        Some(data) => {
                            if ws_sender
                                .send(Message::Binary(data.to_vec().into()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        // Channel replaced or dropped by the router.
                        None => break,
                    }
                }
            }
        }

        // Unregister before the presence sweep so the leaver cannot be a
        // recipient of its own UserLeft fan-out.
        coordinator.router().unregister(conn).await;
        coordinator.disconnect(conn).await;

        let mut s = stats.write().await;
        s.active_connections -= 1;

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the session coordinator.
    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.channel_capacity, 256);
        assert_eq!(config.max_members_per_room, 100);
    }

    #[test]
    fn test_server_creation() {
        let server = CollabServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            channel_capacity: 512,
            max_members_per_room: 50,
        };
        let server = CollabServer::new(config);
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = CollabServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.active_rooms, 0);
    }

    #[tokio::test]
    async fn test_server_coordinator_starts_empty() {
        let server = CollabServer::with_defaults();
        assert!(server.coordinator().identities().is_empty().await);
        assert_eq!(server.coordinator().membership().room_count().await, 0);
    }
}
