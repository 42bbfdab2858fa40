//! Typed contracts for external collaborators.
//!
//! The auth layer, the agent execution engine, and the persistent store are
//! outside this subsystem; each is consumed through one small trait so the
//! core can be tested against lightweight fakes implementing the same
//! contract.

use async_trait::async_trait;

use crate::domain::connection::UserId;
use crate::domain::events::AgentEvent;
use crate::shared::error::GatewayError;

/// Identity resolved by the excluded auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub display_name: Option<String>,
}

/// Credential validation, called once before a handshake begins.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<UserIdentity, GatewayError>;
}

/// Inbound stream of events from the excluded agent/execution engine.
/// The dispatch router is the sole consumer.
#[async_trait]
pub trait EventSource: Send {
    /// Next `(target user, event)` pair, or `None` when the source is done.
    async fn next_event(&mut self) -> Option<(UserId, AgentEvent)>;
}

/// Key-value store with TTL semantics, used only when presence state must
/// survive process restarts. The in-memory model is authoritative when no
/// store is configured.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), GatewayError>;
    async fn delete(&self, key: &str) -> Result<bool, GatewayError>;
}
