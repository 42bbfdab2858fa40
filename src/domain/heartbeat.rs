//! Heartbeat liveness record.

use tokio::time::{Duration, Instant};

use crate::domain::connection::ConnectionId;

/// Heartbeat configuration snapshot, copied onto the record at registration
/// so later config changes don't retroactively alter in-flight connections.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Ping interval
    pub interval: Duration,
    /// How long to wait for a pong or activity after a ping
    pub timeout: Duration,
    /// Consecutive misses before the connection is closed
    pub max_missed: u32,
}

/// Liveness tracking state for one connection.
///
/// Created when a connection transitions to active, updated on every
/// ping/pong/activity, destroyed when the connection closes (or by the
/// cleanup sweep if the close path was interrupted).
#[derive(Debug)]
pub struct HeartbeatRecord {
    /// Back-reference only; current state is always looked up through
    /// the registry.
    pub connection_id: ConnectionId,
    pub config: HeartbeatConfig,
    /// Single source of truth for liveness.
    pub is_alive: bool,
    /// When the supervisor last sent a ping on this connection.
    pub last_ping_at: Option<Instant>,
}

impl HeartbeatRecord {
    pub fn new(connection_id: ConnectionId, config: HeartbeatConfig) -> Self {
        Self {
            connection_id,
            config,
            is_alive: true,
            last_ping_at: None,
        }
    }

    /// Whether the last ping has been outstanding longer than the timeout.
    pub fn ping_expired(&self) -> bool {
        self.last_ping_at
            .map(|at| at.elapsed() >= self.config.timeout)
            .unwrap_or(false)
    }
}
