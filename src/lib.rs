//! # coscribe-collab: presence and broadcast for shared-document rooms
//!
//! Coordinates which connections are in which named rooms while peers
//! collaboratively edit a shared document, and fans join/leave/content
//! events out to the right set of peers. The server stores no document
//! content: a newly joined peer receives state via a targeted sync relayed
//! by an existing peer (last-writer-wins, no merging).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ CollabClient │ ◄─────────────────► │ CollabServer │
//! │ (per user)   │    Binary Proto     │  (central)   │
//! └──────────────┘                     └──────┬───────┘
//!                                             │
//!                                   SessionCoordinator
//!                                   ┌─────────┼─────────┐
//!                                   ▼         ▼         ▼
//!                             Identity    Room      Broadcast
//!                             Registry  Membership   Router
//!                                   └────┬────┘
//!                                        ▼
//!                                  PresenceView
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Binary wire protocol (bincode-encoded requests/events)
//! - [`identity`]: Connection → display-name registry
//! - [`membership`]: Room → member-connection registry
//! - [`presence`]: On-demand `(connection, username)` views
//! - [`router`]: Fire-and-forget fan-out to connections and rooms
//! - [`coordinator`]: The join / change / sync / disconnect operations
//! - [`server`]: WebSocket accept loop and per-connection tasks
//! - [`client`]: WebSocket client handle

pub mod protocol;
pub mod identity;
pub mod membership;
pub mod presence;
pub mod router;
pub mod coordinator;
pub mod server;
pub mod client;

// Re-exports for convenience
pub use protocol::{
    ClientRequest, ConnectionId, ParticipantInfo, ProtocolError, ServerEvent,
};
pub use identity::IdentityRegistry;
pub use membership::RoomMembership;
pub use presence::PresenceView;
pub use router::{BroadcastRouter, RouterStats};
pub use coordinator::SessionCoordinator;
pub use server::{CollabServer, ServerConfig, ServerStats};
pub use client::{CollabClient, ConnectionState, SessionEvent};
