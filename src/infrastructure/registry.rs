//! Connection Registry
//!
//! The single authoritative table of live connections. The registry is the
//! only component permitted to create or destroy the canonical `Connection`
//! record; everything else holds connection IDs and looks current state up
//! here, which is the discipline that prevents the stale-reference races
//! this subsystem exists to eliminate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::domain::connection::HandshakeSlot;
use crate::domain::{Connection, ConnectionId, OutboundMessage, UserId};
use crate::infrastructure::metrics;
use crate::shared::error::GatewayError;

/// Process-wide table of all live connections, keyed by connection ID with
/// a secondary index by user ID.
pub struct ConnectionRegistry {
    /// Canonical connection records by connection ID
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// User ID to connection IDs (one user can have multiple connections)
    user_index: DashMap<UserId, Vec<ConnectionId>>,
    /// Handshakes begun but not yet registered, counted against the ceiling
    in_flight: Arc<AtomicUsize>,
    /// System-wide connection ceiling
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    /// Allocate a connection in the connecting state, owned by the caller
    /// until registered. Fails fast with `ResourceExhausted` when the
    /// ceiling is reached; half-open handshakes count against it too.
    pub fn begin_handshake(
        &self,
        user_id: UserId,
        metadata: HashMap<String, String>,
        sender: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<Arc<Connection>, GatewayError> {
        let occupied = self.connections.len() + self.in_flight.load(Ordering::Acquire);
        if occupied >= self.max_connections {
            tracing::warn!(
                user_id = user_id,
                occupied = occupied,
                limit = self.max_connections,
                "Connection ceiling reached, rejecting handshake"
            );
            return Err(GatewayError::ResourceExhausted {
                limit: self.max_connections,
            });
        }

        let slot = HandshakeSlot::acquire(self.in_flight.clone());
        Ok(Arc::new(Connection::begin(
            user_id,
            metadata,
            sender,
            Some(slot),
        )))
    }

    /// Add a newly active connection. Fails with `DuplicateConnection` if
    /// the ID already exists (an ID-generation bug, fatal for this attempt).
    pub fn register(&self, conn: Arc<Connection>) -> Result<(), GatewayError> {
        let id = conn.id().clone();
        match self.connections.entry(id.clone()) {
            Entry::Occupied(_) => {
                tracing::error!(connection_id = %id, "Duplicate connection id at registration");
                return Err(GatewayError::DuplicateConnection(id));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(conn.clone());
            }
        }

        self.user_index
            .entry(conn.user_id())
            .or_default()
            .push(id.clone());

        conn.take_handshake_slot();
        metrics::set_connections(self.connections.len());

        tracing::info!(
            user_id = conn.user_id(),
            connection_id = %id,
            "Connection registered"
        );
        Ok(())
    }

    /// Remove a connection. Idempotent: shutdown races are expected, so
    /// removing twice is a no-op, not an error.
    pub fn deregister(&self, connection_id: &str) {
        if let Some((_, conn)) = self.connections.remove(connection_id) {
            let user_id = conn.user_id();
            if let Some(mut ids) = self.user_index.get_mut(&user_id) {
                ids.retain(|id| id != connection_id);
            }
            self.user_index.remove_if(&user_id, |_, ids| ids.is_empty());

            metrics::set_connections(self.connections.len());
            tracing::info!(
                user_id = user_id,
                connection_id = %connection_id,
                "Connection deregistered"
            );
        }
    }

    /// O(1) lookup; never blocks on I/O.
    pub fn lookup(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// All connections currently registered for a user, reflecting registry
    /// state at call time.
    pub fn list_for_user(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnectionId> = self
            .user_index
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        ids.iter().filter_map(|id| self.lookup(id)).collect()
    }

    /// Count of connections able to carry traffic, used for capacity and
    /// back-pressure decisions.
    pub fn count_active(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().state().is_routable())
            .count()
    }

    /// Total registered connections regardless of state.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of all registered connections, for the heartbeat sweep.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
