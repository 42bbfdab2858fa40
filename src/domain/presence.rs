//! Per-user presence aggregate.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::connection::{ConnectionId, UserId};

/// Aggregates a user's live connections into one presence signal.
///
/// Holds connection IDs only, never connection objects: current state is
/// always looked up through the registry so a stale reference can't
/// resurrect a closed connection.
#[derive(Debug)]
pub struct PresenceEntry {
    pub user_id: UserId,
    /// Connections currently active or degraded for this user
    pub connection_ids: HashSet<ConnectionId>,
    /// Most recent activity across all of the user's connections
    pub last_activity: Instant,
    /// Wall-clock last-seen, carried into persisted snapshots
    pub last_seen: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            connection_ids: HashSet::new(),
            last_activity: Instant::now(),
            last_seen: Utc::now(),
        }
    }

    /// Derived: online iff at least one connection remains.
    pub fn is_online(&self) -> bool {
        !self.connection_ids.is_empty()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.last_seen = Utc::now();
    }
}

/// Presence transition signal, emitted at most once per online/offline
/// transition regardless of how many connections the user holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSignal {
    UserCameOnline(UserId),
    UserWentOffline(UserId),
}

impl PresenceSignal {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::UserCameOnline(id) | Self::UserWentOffline(id) => *id,
        }
    }
}

/// Serializable presence snapshot for the optional session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub user_id: UserId,
    pub is_online: bool,
    pub connection_count: usize,
    pub last_seen: i64,
}
