//! Heartbeat Supervisor
//!
//! Periodically verifies liveness of every active/degraded connection
//! without blocking application traffic. One scheduling loop pings all
//! watched connections; a separate, lower-frequency sweep releases records
//! leaked by interrupted close paths.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::HeartbeatSettings;
use crate::domain::{
    Connection, ConnectionId, ConnectionState, HeartbeatConfig, HeartbeatRecord, OutboundMessage,
};
use crate::application::presence::PresenceCoordinator;
use crate::infrastructure::metrics;
use crate::infrastructure::registry::ConnectionRegistry;

/// Liveness checker over all registered connections.
///
/// Explicitly constructed and injected (never a module global), created at
/// process start and shut down via its handle at process stop.
pub struct HeartbeatSupervisor {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceCoordinator>,
    records: DashMap<ConnectionId, HeartbeatRecord>,
    settings: HeartbeatSettings,
}

/// Handle for stopping a spawned supervisor loop.
pub struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

impl HeartbeatSupervisor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceCoordinator>,
        settings: HeartbeatSettings,
    ) -> Self {
        Self {
            registry,
            presence,
            records: DashMap::new(),
            settings,
        }
    }

    /// Begin liveness tracking for a newly active connection. The config is
    /// snapshotted onto the record, so later settings changes don't alter
    /// in-flight connections.
    pub fn watch(&self, conn: &Connection) {
        let config = HeartbeatConfig {
            interval: self.settings.interval(),
            timeout: self.settings.timeout(),
            max_missed: self.settings.max_missed,
        };
        self.records
            .insert(conn.id().clone(), HeartbeatRecord::new(conn.id().clone(), config));
    }

    /// Release the liveness record for a closed connection. Idempotent.
    pub fn forget(&self, connection_id: &str) {
        self.records.remove(connection_id);
    }

    /// Liveness as last determined by the supervisor, or `None` when the
    /// connection is not watched.
    pub fn is_alive(&self, connection_id: &str) -> Option<bool> {
        self.records.get(connection_id).map(|r| r.is_alive)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Spawn the scheduling loop. Returns a handle used to stop it.
    pub fn spawn(self: &Arc<Self>) -> SupervisorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(self).run(shutdown_rx));
        SupervisorHandle { shutdown_tx, task }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ping_tick = interval(self.settings.interval());
        let mut sweep_tick = interval(self.settings.cleanup_interval());
        ping_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the immediate first ticks
        ping_tick.tick().await;
        sweep_tick.tick().await;

        tracing::info!(
            interval_secs = self.settings.interval_secs,
            timeout_secs = self.settings.timeout_secs,
            max_missed = self.settings.max_missed,
            "Heartbeat supervisor started"
        );

        loop {
            tokio::select! {
                _ = ping_tick.tick() => self.tick(),
                _ = sweep_tick.tick() => self.sweep(),
                _ = shutdown.changed() => {
                    tracing::info!("Heartbeat supervisor stopping");
                    break;
                }
            }
        }
    }

    /// One liveness pass. Each connection's check is isolated: a failing
    /// ping on one connection never stops the pass for the others.
    fn tick(&self) {
        let ids: Vec<ConnectionId> = self.records.iter().map(|r| r.key().clone()).collect();
        let mut exhausted: Vec<Arc<Connection>> = Vec::new();

        for id in ids {
            // Always re-resolve through the registry; a cached connection
            // reference could be stale.
            let Some(conn) = self.registry.lookup(&id) else {
                continue; // sweep reclaims the record
            };
            if !conn.state().is_routable() {
                continue;
            }
            let Some(mut record) = self.records.get_mut(&id) else {
                continue;
            };

            // Any inbound activity since the last ping counts as liveness
            // proof; a chatty connection never owes us a pong.
            if let Some(ping_at) = record.last_ping_at {
                if conn.last_activity_elapsed() < ping_at.elapsed() {
                    record.is_alive = true;
                } else if ping_at.elapsed() >= record.config.timeout {
                    record.is_alive = false;
                    metrics::record_heartbeat_miss("timeout");
                    if conn.mark_heartbeat_missed(record.config.max_missed)
                        == ConnectionState::Closing
                    {
                        drop(record);
                        exhausted.push(conn);
                        continue;
                    }
                }
            }

            match conn.send(OutboundMessage::Ping) {
                Ok(()) => {
                    record.last_ping_at = Some(Instant::now());
                }
                Err(e) => {
                    // Transport failure on the ping itself is an immediate
                    // miss; no indefinite resend.
                    tracing::debug!(connection_id = %id, error = %e, "Heartbeat ping send failed");
                    record.is_alive = false;
                    metrics::record_heartbeat_miss("send_failed");
                    if conn.mark_heartbeat_missed(record.config.max_missed)
                        == ConnectionState::Closing
                    {
                        drop(record);
                        exhausted.push(conn);
                    }
                }
            }
        }

        for conn in exhausted {
            self.expire(&conn);
        }
    }

    /// Tear down bookkeeping for a connection that exhausted its heartbeat
    /// budget. The close message was already queued by the state machine;
    /// the connection's own worker finishes the drain and records the close,
    /// so no close accounting happens here.
    fn expire(&self, conn: &Connection) {
        tracing::warn!(
            connection_id = %conn.id(),
            user_id = conn.user_id(),
            "Heartbeat exhausted, closing connection"
        );
        self.records.remove(conn.id());
        self.registry.deregister(conn.id());
        self.presence.on_connection_removed(conn.user_id(), conn.id());
    }

    /// Low-frequency sweep for records whose close path was interrupted.
    /// Recency of activity always wins over elapsed-time heuristics: a
    /// record with activity fresher than the staleness threshold is never
    /// removed, whatever its nominal state.
    fn sweep(&self) {
        let stale_after = self.settings.stale_after();
        let before = self.records.len();
        self.records.retain(|id, _| match self.registry.lookup(id) {
            None => false,
            Some(conn) => {
                conn.state() != ConnectionState::Closed
                    || conn.last_activity_elapsed() < stale_after
            }
        });
        let swept = before - self.records.len();
        if swept > 0 {
            tracing::debug!(swept = swept, "Heartbeat sweep released stale records");
        }
    }
}
