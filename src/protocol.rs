//! Binary wire protocol for room presence and content broadcast.
//!
//! Requests flow client → server, events flow server → client. Both are
//! bincode-encoded enums carried in WebSocket binary frames, so a typical
//! `ContentChanged` event is a one-byte tag plus the length-prefixed
//! content string.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-assigned identifier for one live connection.
///
/// Minted by the server when a socket is accepted; lives for exactly one
/// transport session and is never reused after disconnect. The server
/// announces it to the owning client via [`ServerEvent::Welcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mint a fresh connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One entry of a room presence view: a live connection and its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub connection: ConnectionId,
    pub username: String,
}

impl ParticipantInfo {
    pub fn new(connection: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            connection,
            username: username.into(),
        }
    }
}

/// Requests a connected peer sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Join a room under a display name.
    ///
    /// Repeating with a new name overwrites the identity; repeating with a
    /// different room adds a second membership (multi-room is permitted).
    JoinRoom { room: String, username: String },

    /// Broadcast new document content to everyone in the room.
    ChangeContent { room: String, content: String },

    /// Push current content directly to one newly joined peer, bypassing
    /// the room-wide fan-out.
    SyncContent {
        target: ConnectionId,
        content: String,
    },

    /// Heartbeat.
    Ping,
}

/// Events the server delivers to one or many connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// First event on every connection: the transport-assigned id.
    Welcome { connection: ConnectionId },

    /// Someone joined a room. Every member receives the full updated view,
    /// the joiner included.
    UserJoined {
        view: Vec<ParticipantInfo>,
        username: String,
        connection: ConnectionId,
    },

    /// Document content changed somewhere in the room.
    ContentChanged { content: String },

    /// Authoritative content pushed by an existing peer.
    SyncContent { content: String },

    /// A member's transport session ended.
    UserLeft {
        connection: ConnectionId,
        username: String,
    },

    /// Heartbeat response.
    Pong,
}

impl ClientRequest {
    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (req, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(req)
    }
}

impl ServerEvent {
    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (event, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(event)
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_join_room_roundtrip() {
        let req = ClientRequest::JoinRoom {
            room: "r1".into(),
            username: "alice".into(),
        };
        let encoded = req.encode().unwrap();
        let decoded = ClientRequest::decode(&encoded).unwrap();
        assert_eq!(req, decoded);
    }

    #[test]
    fn test_sync_content_roundtrip() {
        let target = ConnectionId::new();
        let req = ClientRequest::SyncContent {
            target,
            content: "print(1)".into(),
        };
        let encoded = req.encode().unwrap();
        match ClientRequest::decode(&encoded).unwrap() {
            ClientRequest::SyncContent { target: t, content } => {
                assert_eq!(t, target);
                assert_eq!(content, "print(1)");
            }
            other => panic!("Expected SyncContent, got {other:?}"),
        }
    }

    #[test]
    fn test_user_joined_roundtrip() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let event = ServerEvent::UserJoined {
            view: vec![
                ParticipantInfo::new(a, "alice"),
                ParticipantInfo::new(b, "bob"),
            ],
            username: "bob".into(),
            connection: b,
        };
        let encoded = event.encode().unwrap();
        let decoded = ServerEvent::decode(&encoded).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn test_user_left_roundtrip() {
        let conn = ConnectionId::new();
        let event = ServerEvent::UserLeft {
            connection: conn,
            username: "alice".into(),
        };
        let encoded = event.encode().unwrap();
        assert_eq!(ServerEvent::decode(&encoded).unwrap(), event);
    }

    #[test]
    fn test_content_changed_size_efficient() {
        let event = ServerEvent::ContentChanged {
            content: "x".repeat(50),
        };
        let encoded = event.encode().unwrap();
        // One-byte tag + length prefix + 50 bytes of content.
        assert!(
            encoded.len() < 60,
            "Encoded size {} too large for 50-byte content",
            encoded.len()
        );
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(ClientRequest::decode(&garbage).is_err());
        assert!(ServerEvent::decode(&garbage).is_err());
    }

    #[test]
    fn test_ping_pong_roundtrip() {
        let ping = ClientRequest::Ping.encode().unwrap();
        let pong = ServerEvent::Pong.encode().unwrap();
        assert_eq!(ClientRequest::decode(&ping).unwrap(), ClientRequest::Ping);
        assert_eq!(ServerEvent::decode(&pong).unwrap(), ServerEvent::Pong);
    }

    #[test]
    fn test_empty_content() {
        let event = ServerEvent::ContentChanged { content: String::new() };
        let encoded = event.encode().unwrap();
        match ServerEvent::decode(&encoded).unwrap() {
            ServerEvent::ContentChanged { content } => assert!(content.is_empty()),
            other => panic!("Expected ContentChanged, got {other:?}"),
        }
    }

    #[test]
    fn test_large_content() {
        // Simulate a whole pasted document: 64KB.
        let content = "a".repeat(65536);
        let event = ServerEvent::SyncContent {
            content: content.clone(),
        };
        let encoded = event.encode().unwrap();
        match ServerEvent::decode(&encoded).unwrap() {
            ServerEvent::SyncContent { content: c } => assert_eq!(c, content),
            other => panic!("Expected SyncContent, got {other:?}"),
        }
    }
}
