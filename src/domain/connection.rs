//! Connection entity and lifecycle state machine.
//!
//! A `Connection` represents one transport-level socket bound to one
//! authenticated user. Its state only ever moves forward through
//! `Connecting -> Active -> (Degraded -> Active)* -> Closing -> Closed`;
//! nothing moves a connection out of `Closed`. All transitions for a single
//! connection are serialized behind one short mutex that is never held
//! across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::events::OutboundMessage;
use crate::shared::error::GatewayError;

/// User identifier, assigned by the excluded auth layer.
pub type UserId = i64;

/// Opaque connection identifier, generated at accept time.
pub type ConnectionId = String;

/// Lifecycle state of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Socket accepted at the transport layer, application handshake
    /// (Identify + auth binding) not finished. Application I/O is refused.
    Connecting,
    /// Handshake complete; I/O permitted, heartbeat polling active.
    Active,
    /// At least one heartbeat missed but not exhausted. I/O still permitted.
    Degraded,
    /// Close requested; no new sends, in-flight sends may drain.
    Closing,
    /// Terminal. All resources released.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Whether the connection may carry application traffic.
    pub fn is_routable(&self) -> bool {
        matches!(self, Self::Active | Self::Degraded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a close was initiated. Carried into logs and the close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnect,
    HeartbeatExhausted,
    ServerShutdown,
    TransportError,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientDisconnect => "client_disconnect",
            Self::HeartbeatExhausted => "heartbeat_exhausted",
            Self::ServerShutdown => "server_shutdown",
            Self::TransportError => "transport_error",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capacity slot held from `begin_handshake` until registration (or until
/// the connection is dropped), so a burst of half-open sockets cannot slip
/// past the connection ceiling.
#[derive(Debug)]
pub(crate) struct HandshakeSlot {
    counter: Arc<AtomicUsize>,
}

impl HandshakeSlot {
    pub(crate) fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for HandshakeSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Mutable lifecycle bookkeeping, guarded by the per-connection mutex.
#[derive(Debug)]
struct Lifecycle {
    state: ConnectionState,
    missed_heartbeats: u32,
    last_activity_at: Instant,
    last_heartbeat_ack_at: Instant,
    close_reason: Option<CloseReason>,
    handshake_slot: Option<HandshakeSlot>,
}

/// One transport-level socket bound to one authenticated user.
///
/// Owned by the registry once registered; before that, by the handshake
/// routine that created it. Every other component holds only the connection
/// ID and looks current state up through the registry.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    /// Client capabilities negotiated at Identify time. Immutable afterwards.
    metadata: HashMap<String, String>,
    /// Outbound queue drained by the connection's writer task. FIFO, so
    /// events enqueued from one logical source arrive in order.
    sender: mpsc::UnboundedSender<OutboundMessage>,
    lifecycle: Mutex<Lifecycle>,
}

impl Connection {
    /// Create a connection in the `Connecting` state. Called by the registry
    /// as part of `begin_handshake`; the returned connection is owned by the
    /// handshake routine until registered.
    pub(crate) fn begin(
        user_id: UserId,
        metadata: HashMap<String, String>,
        sender: mpsc::UnboundedSender<OutboundMessage>,
        slot: Option<HandshakeSlot>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            created_at: Utc::now(),
            metadata,
            sender,
            lifecycle: Mutex::new(Lifecycle {
                state: ConnectionState::Connecting,
                missed_heartbeats: 0,
                last_activity_at: now,
                last_heartbeat_ack_at: now,
                close_reason: None,
                handshake_slot: slot,
            }),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.lock().state
    }

    pub fn missed_heartbeats(&self) -> u32 {
        self.lifecycle.lock().missed_heartbeats
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.lock().close_reason
    }

    /// Time since the last inbound message or pong.
    pub fn last_activity_elapsed(&self) -> Duration {
        self.lifecycle.lock().last_activity_at.elapsed()
    }

    /// Time since the last heartbeat acknowledgement.
    pub fn last_heartbeat_ack_elapsed(&self) -> Duration {
        self.lifecycle.lock().last_heartbeat_ack_at.elapsed()
    }

    /// Transition `Connecting -> Active`. A second call is the double-accept
    /// bug and is rejected with `InvalidState` rather than silently ignored.
    pub fn complete_handshake(&self) -> Result<(), GatewayError> {
        let mut lc = self.lifecycle.lock();
        if lc.state != ConnectionState::Connecting {
            return Err(GatewayError::InvalidState {
                connection_id: self.id.clone(),
                from: lc.state.as_str(),
                attempted: "complete_handshake",
            });
        }
        lc.state = ConnectionState::Active;
        lc.last_activity_at = Instant::now();
        drop(lc);

        tracing::debug!(
            connection_id = %self.id,
            user_id = self.user_id,
            "Handshake complete"
        );
        Ok(())
    }

    /// Record a missed heartbeat. `Active -> Degraded` on the first miss;
    /// further misses increment the counter until `max_missed` is reached,
    /// at which point the connection transitions to `Closing` and a close
    /// message is queued for the writer. Returns the resulting state.
    pub fn mark_heartbeat_missed(&self, max_missed: u32) -> ConnectionState {
        let mut lc = self.lifecycle.lock();
        match lc.state {
            ConnectionState::Active => {
                lc.missed_heartbeats = 1;
                lc.state = ConnectionState::Degraded;
                if lc.missed_heartbeats >= max_missed {
                    lc.state = ConnectionState::Closing;
                    lc.close_reason = Some(CloseReason::HeartbeatExhausted);
                }
            }
            ConnectionState::Degraded => {
                lc.missed_heartbeats += 1;
                if lc.missed_heartbeats >= max_missed {
                    lc.state = ConnectionState::Closing;
                    lc.close_reason = Some(CloseReason::HeartbeatExhausted);
                }
            }
            // Already closing, closed, or not yet handshaked
            _ => {}
        }
        let state = lc.state;
        let missed = lc.missed_heartbeats;
        drop(lc);

        tracing::debug!(
            connection_id = %self.id,
            user_id = self.user_id,
            missed = missed,
            state = %state,
            "Heartbeat missed"
        );
        if state == ConnectionState::Closing {
            // Wake the writer so it can emit the close frame.
            let _ = self.sender.send(OutboundMessage::Close(CloseReason::HeartbeatExhausted));
        }
        state
    }

    /// Record inbound activity. Any inbound message is proof of life:
    /// `Degraded -> Active` and the miss counter is zeroed.
    pub fn record_activity(&self) {
        let mut lc = self.lifecycle.lock();
        lc.last_activity_at = Instant::now();
        if lc.state == ConnectionState::Degraded {
            lc.state = ConnectionState::Active;
        }
        if lc.state == ConnectionState::Active {
            lc.missed_heartbeats = 0;
        }
    }

    /// Record a heartbeat acknowledgement (client pong or client-initiated
    /// heartbeat). Counts as activity.
    pub fn record_heartbeat_ack(&self) {
        {
            let mut lc = self.lifecycle.lock();
            lc.last_heartbeat_ack_at = Instant::now();
        }
        self.record_activity();
    }

    /// Request close. Transitions any non-terminal state to `Closing` and
    /// queues a close message for the writer; in-flight sends may drain.
    /// Idempotent: repeated requests keep the first reason.
    pub fn request_close(&self, reason: CloseReason) -> ConnectionState {
        let mut lc = self.lifecycle.lock();
        match lc.state {
            ConnectionState::Closing | ConnectionState::Closed => lc.state,
            _ => {
                lc.state = ConnectionState::Closing;
                lc.close_reason = Some(reason);
                drop(lc);

                tracing::info!(
                    connection_id = %self.id,
                    user_id = self.user_id,
                    reason = %reason,
                    "Close requested"
                );
                let _ = self.sender.send(OutboundMessage::Close(reason));
                ConnectionState::Closing
            }
        }
    }

    /// Finalize close after outstanding sends have drained (or the drain
    /// timeout force-closed them). Terminal; idempotent.
    pub fn finalize_close(&self) {
        let mut lc = self.lifecycle.lock();
        if lc.state == ConnectionState::Closed {
            return;
        }
        lc.state = ConnectionState::Closed;
        if lc.close_reason.is_none() {
            lc.close_reason = Some(CloseReason::ClientDisconnect);
        }
        let reason = lc.close_reason;
        drop(lc);

        tracing::info!(
            connection_id = %self.id,
            user_id = self.user_id,
            reason = %reason.map(|r| r.as_str()).unwrap_or("unknown"),
            "Connection closed"
        );
    }

    /// Enforcement primitive called before every send/receive.
    ///
    /// Makes "was accept called yet?" an explicit, typed answer instead of
    /// an incidental runtime error deep in the transport.
    pub fn guard_ready_for_io(&self) -> Result<(), GatewayError> {
        match self.lifecycle.lock().state {
            ConnectionState::Connecting => Err(GatewayError::NotReady(self.id.clone())),
            ConnectionState::Closing | ConnectionState::Closed => {
                Err(GatewayError::ConnectionClosed(self.id.clone()))
            }
            ConnectionState::Active | ConnectionState::Degraded => Ok(()),
        }
    }

    /// Queue an outbound message, guarded by `guard_ready_for_io`. A
    /// disappeared writer counts as a closed connection.
    pub fn send(&self, message: OutboundMessage) -> Result<(), GatewayError> {
        self.guard_ready_for_io()?;
        self.sender
            .send(message)
            .map_err(|_| GatewayError::ConnectionClosed(self.id.clone()))
    }

    /// Release the handshake capacity slot at registration time.
    pub(crate) fn take_handshake_slot(&self) {
        self.lifecycle.lock().handshake_slot.take();
    }
}
