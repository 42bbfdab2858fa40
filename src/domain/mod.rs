//! # Domain Layer
//!
//! Core lifecycle logic of the gateway, independent of transport and
//! infrastructure concerns.
//!
//! ## Structure
//!
//! - **connection**: the per-connection state machine and its guards
//! - **heartbeat**: liveness record and config snapshot
//! - **presence**: per-user presence aggregate and transition signals
//! - **events**: typed agent/chat events routed over connections
//! - **contracts**: traits for the excluded collaborators (auth, event
//!   source, session store)

pub mod connection;
pub mod contracts;
pub mod events;
pub mod heartbeat;
pub mod presence;

// Re-export commonly used types
pub use connection::{CloseReason, Connection, ConnectionId, ConnectionState, UserId};
pub use contracts::{Authenticator, EventSource, SessionStore, UserIdentity};
pub use events::{AgentEvent, OutboundMessage};
pub use heartbeat::{HeartbeatConfig, HeartbeatRecord};
pub use presence::{PresenceEntry, PresenceSignal, PresenceSnapshot};
