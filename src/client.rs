//! WebSocket client handle for connecting to the collab server.
//!
//! Covers the inbound surface (join, content change, targeted sync) and
//! surfaces server events through an mpsc receiver. At-most-once semantics
//! end to end: there is no reconnect and nothing is queued while
//! disconnected.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::{
    ClientRequest, ConnectionId, ParticipantInfo, ProtocolError, ServerEvent,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the client.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Handshake complete; carries our transport-assigned id.
    Connected { connection: ConnectionId },
    /// Connection lost or closed.
    Disconnected,
    /// Someone (possibly us) joined a room we are in.
    Joined {
        view: Vec<ParticipantInfo>,
        username: String,
        connection: ConnectionId,
    },
    /// Document content changed in a room we are in.
    ContentChanged { content: String },
    /// An existing peer pushed authoritative content directly to us.
    SyncReceived { content: String },
    /// A member of one of our rooms disconnected.
    UserLeft {
        connection: ConnectionId,
        username: String,
    },
    /// Heartbeat response.
    Pong,
}

/// The collab client.
///
/// Manages one WebSocket connection to the server; spawns a writer task
/// and a reader task on connect.
pub struct CollabClient {
    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Our transport-assigned id, learned from the server's Welcome
    connection: Arc<RwLock<Option<ConnectionId>>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SessionEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<SessionEvent>,

    /// Server URL
    server_url: String,
}

impl CollabClient {
    /// Create a new client.
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connection: Arc::new(RwLock::new(None)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages. The
    /// [`SessionEvent::Connected`] event carries the id the server assigned
    /// to us.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_result = tokio_tungstenite::connect_async(self.server_url.as_str()).await;

        match ws_result {
            Ok((ws_stream, _)) => {
                let (mut ws_writer, mut ws_reader) = ws_stream.split();

                // Writer task: forward outgoing channel to WebSocket, then
                // close the socket cleanly when the channel ends.
                let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
                self.outgoing_tx = Some(out_tx);
                tokio::spawn(async move {
                    use futures_util::SinkExt;
                    while let Some(data) = out_rx.recv().await {
                        if ws_writer
                            .send(tokio_tungstenite::tungstenite::Message::Binary(data.into()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    let _ = ws_writer
                        .send(tokio_tungstenite::tungstenite::Message::Close(None))
                        .await;
                });

                *self.state.write().await = ConnectionState::Connected;

                // Reader task: decode server events for the application.
                let event_tx = self.event_tx.clone();
                let state = self.state.clone();
                let connection = self.connection.clone();
                tokio::spawn(async move {
                    while let Some(msg) = ws_reader.next().await {
                        match msg {
                            Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                                let bytes: Vec<u8> = data.into();
                                let server_event = match ServerEvent::decode(&bytes) {
                                    Ok(event) => event,
                                    Err(e) => {
                                        log::warn!("Failed to decode server event: {e}");
                                        continue;
                                    }
                                };

                                let event = match server_event {
                                    ServerEvent::Welcome { connection: conn } => {
                                        *connection.write().await = Some(conn);
                                        Some(SessionEvent::Connected { connection: conn })
                                    }
                                    ServerEvent::UserJoined {
                                        view,
                                        username,
                                        connection,
                                    } => Some(SessionEvent::Joined {
                                        view,
                                        username,
                                        connection,
                                    }),
                                    ServerEvent::ContentChanged { content } => {
                                        Some(SessionEvent::ContentChanged { content })
                                    }
                                    ServerEvent::SyncContent { content } => {
                                        Some(SessionEvent::SyncReceived { content })
                                    }
                                    ServerEvent::UserLeft {
                                        connection,
                                        username,
                                    } => Some(SessionEvent::UserLeft {
                                        connection,
                                        username,
                                    }),
                                    ServerEvent::Pong => Some(SessionEvent::Pong),
                                };

                                if let Some(evt) = event {
                                    let _ = event_tx.send(evt).await;
                                }
                            }
                            Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                                break;
                            }
                            _ => {}
                        }
                    }

                    // Connection lost
                    *state.write().await = ConnectionState::Disconnected;
                    let _ = event_tx.send(SessionEvent::Disconnected).await;
                });

                Ok(())
            }
            Err(_e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Join a room under a display name.
    pub async fn join_room(&self, room: &str, username: &str) -> Result<(), ProtocolError> {
        self.send_request(&ClientRequest::JoinRoom {
            room: room.to_string(),
            username: username.to_string(),
        })
        .await
    }

    /// Broadcast new content to everyone in the room.
    pub async fn change_content(&self, room: &str, content: &str) -> Result<(), ProtocolError> {
        self.send_request(&ClientRequest::ChangeContent {
            room: room.to_string(),
            content: content.to_string(),
        })
        .await
    }

    /// Push current content directly to one peer.
    pub async fn sync_content(
        &self,
        target: ConnectionId,
        content: &str,
    ) -> Result<(), ProtocolError> {
        self.send_request(&ClientRequest::SyncContent {
            target,
            content: content.to_string(),
        })
        .await
    }

    /// Send a heartbeat.
    pub async fn ping(&self) -> Result<(), ProtocolError> {
        self.send_request(&ClientRequest::Ping).await
    }

    /// Close the connection.
    ///
    /// Ends the writer task, which sends a Close frame; the server then
    /// runs its disconnect cleanup.
    pub async fn close(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    async fn send_request(&self, request: &ClientRequest) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProtocolError::ConnectionClosed);
        }

        let encoded = request.encode()?;
        match self.outgoing_tx {
            Some(ref tx) => tx
                .send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Our transport-assigned id, once the Welcome has arrived.
    pub async fn connection_id(&self) -> Option<ConnectionId> {
        *self.connection.read().await
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CollabClient::new("ws://localhost:9090");
        assert_eq!(client.server_url(), "ws://localhost:9090");
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = CollabClient::new("ws://localhost:9090");
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert!(client.connection_id().await.is_none());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let client = CollabClient::new("ws://localhost:9090");
        assert!(client.join_room("r1", "alice").await.is_err());
        assert!(client.change_content("r1", "x").await.is_err());
        assert!(client.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_take_event_rx() {
        let mut client = CollabClient::new("ws://localhost:9090");
        // First take should succeed
        assert!(client.take_event_rx().is_some());
        // Second take should return None
        assert!(client.take_event_rx().is_none());
    }

    #[test]
    fn test_connection_state_values() {
        assert_ne!(ConnectionState::Disconnected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Connecting, ConnectionState::Connected);
    }
}
