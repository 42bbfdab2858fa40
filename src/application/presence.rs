//! Presence Coordinator
//!
//! Translates the set of a user's live connections into a single presence
//! signal, correctly handling multiple simultaneous connections
//! (multi-tab/multi-device).

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::domain::{PresenceEntry, PresenceSignal, PresenceSnapshot, SessionStore, UserId};
use crate::infrastructure::metrics;
use crate::infrastructure::registry::ConnectionRegistry;
use crate::infrastructure::store::keys;

/// Broadcast capacity for presence signals
const SIGNAL_CAPACITY: usize = 1024;

/// Per-user presence aggregation over the connection registry.
///
/// Add/remove for the same user are atomic (the entry is mutated under its
/// map shard lock), so two connections of one user racing open/close cannot
/// corrupt the set or emit duplicate online/offline signals.
pub struct PresenceCoordinator {
    registry: Arc<ConnectionRegistry>,
    entries: DashMap<UserId, PresenceEntry>,
    signals: broadcast::Sender<PresenceSignal>,
    /// Optional snapshot persistence; in-memory state stays authoritative.
    store: Option<Arc<dyn SessionStore>>,
    snapshot_ttl_secs: u64,
}

impl PresenceCoordinator {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            registry,
            entries: DashMap::new(),
            signals,
            store: None,
            snapshot_ttl_secs: 0,
        }
    }

    /// Attach a session store; presence snapshots are written on every
    /// online/offline transition with the given TTL.
    pub fn with_store(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn SessionStore>,
        snapshot_ttl_secs: u64,
    ) -> Self {
        let mut coordinator = Self::new(registry);
        coordinator.store = Some(store);
        coordinator.snapshot_ttl_secs = snapshot_ttl_secs;
        coordinator
    }

    /// Subscribe to online/offline transition signals.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceSignal> {
        self.signals.subscribe()
    }

    /// Record a connection joining the user's set. Emits `UserCameOnline`
    /// exactly once per empty -> non-empty transition, not once per
    /// connection.
    pub fn on_connection_added(&self, user_id: UserId, connection_id: &str) {
        let came_online = {
            let mut entry = self
                .entries
                .entry(user_id)
                .or_insert_with(|| PresenceEntry::new(user_id));
            let was_empty = entry.connection_ids.is_empty();
            let inserted = entry.connection_ids.insert(connection_id.to_owned());
            entry.touch();
            let came_online = was_empty && inserted;
            if came_online {
                // Emitted while the entry is still held, so subscribers see
                // signals in the same order the transitions happened.
                let _ = self.signals.send(PresenceSignal::UserCameOnline(user_id));
            }
            came_online
        };

        if came_online {
            tracing::info!(user_id = user_id, "User came online");
            metrics::set_users_online(self.entries.len());
            self.persist(user_id, true, 1);
        }
    }

    /// Record a connection leaving the user's set. Emits `UserWentOffline`
    /// exactly once, when the set becomes empty. Idempotent per connection.
    pub fn on_connection_removed(&self, user_id: UserId, connection_id: &str) {
        let went_offline = match self.entries.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                let removed = occupied.get_mut().connection_ids.remove(connection_id);
                if removed {
                    occupied.get_mut().touch();
                    if occupied.get().connection_ids.is_empty() {
                        // Same ordering discipline as the add path: signal
                        // before the entry is released.
                        let _ = self.signals.send(PresenceSignal::UserWentOffline(user_id));
                        occupied.remove();
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        if went_offline {
            tracing::info!(user_id = user_id, "User went offline");
            metrics::set_users_online(self.entries.len());
            self.persist(user_id, false, 0);
        }
    }

    /// Record user activity (any inbound message on any of their
    /// connections), for idle-session policies.
    pub fn touch(&self, user_id: UserId) {
        if let Some(mut entry) = self.entries.get_mut(&user_id) {
            entry.touch();
        }
    }

    /// O(1) presence check.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.entries
            .get(&user_id)
            .map(|entry| entry.is_online())
            .unwrap_or(false)
    }

    /// Number of users currently online.
    pub fn online_count(&self) -> usize {
        self.entries.len()
    }

    /// Time since the user's most recent activity across all their
    /// connections. `None` when the user has no presence entry at all.
    ///
    /// Live connection timestamps are read through the registry rather than
    /// cached here, so the answer reflects current state.
    pub fn get_inactivity_duration(&self, user_id: UserId) -> Option<Duration> {
        let most_recent = self
            .registry
            .list_for_user(user_id)
            .iter()
            .map(|conn| conn.last_activity_elapsed())
            .min();
        if most_recent.is_some() {
            return most_recent;
        }
        self.entries
            .get(&user_id)
            .map(|entry| entry.last_activity.elapsed())
    }

    /// Fire-and-forget snapshot write; store failures are logged, never
    /// propagated into presence bookkeeping.
    fn persist(&self, user_id: UserId, is_online: bool, connection_count: usize) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let ttl = self.snapshot_ttl_secs;
        let snapshot = PresenceSnapshot {
            user_id,
            is_online,
            connection_count,
            last_seen: Utc::now().timestamp(),
        };
        tokio::spawn(async move {
            let key = keys::presence(user_id);
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    if let Err(e) = store.set(&key, &json, ttl).await {
                        tracing::warn!(user_id = user_id, error = %e, "Presence snapshot write failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id = user_id, error = %e, "Presence snapshot serialization failed");
                }
            }
        });
    }
}
