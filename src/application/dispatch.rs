//! Event Dispatch Router
//!
//! Delivers typed events to exactly the connections belonging to the
//! event's target user, never to any other user's connections.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::{AgentEvent, ConnectionId, EventSource, UserId};
use crate::infrastructure::metrics;
use crate::infrastructure::registry::ConnectionRegistry;
use crate::shared::error::GatewayError;

/// Outcome of one dispatch call. Partial delivery to a multi-device user is
/// a valid outcome, not a system failure, so failures are reported rather
/// than raised.
#[derive(Debug)]
pub struct DeliveryReport {
    pub user_id: UserId,
    pub delivered: Vec<ConnectionId>,
    pub failed: Vec<(ConnectionId, GatewayError)>,
}

impl DeliveryReport {
    pub fn delivered_any(&self) -> bool {
        !self.delivered.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Routes inbound typed events to a user's live connections.
pub struct EventDispatchRouter {
    registry: Arc<ConnectionRegistry>,
}

impl EventDispatchRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver an event to every live connection of `user_id`.
    ///
    /// Returns `Err` only for an isolation violation (a connection under
    /// the user's index owned by someone else), which indicates a security
    /// defect, not a transient condition. Per-connection delivery failures
    /// land in the report.
    pub fn dispatch(
        &self,
        user_id: UserId,
        event: AgentEvent,
    ) -> Result<DeliveryReport, GatewayError> {
        let mut report = DeliveryReport {
            user_id,
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        for conn in self.registry.list_for_user(user_id) {
            // Ownership is checked here defensively, not only trusted from
            // the index, because cross-user contamination is the one failure
            // this router must make impossible.
            if conn.user_id() != user_id {
                tracing::error!(
                    connection_id = %conn.id(),
                    expected_user = user_id,
                    actual_user = conn.user_id(),
                    "Isolation violation during dispatch"
                );
                return Err(GatewayError::IsolationViolation {
                    expected: user_id,
                    actual: conn.user_id(),
                });
            }

            match conn.send(event.clone().into()) {
                Ok(()) => {
                    metrics::record_dispatch("delivered");
                    report.delivered.push(conn.id().clone());
                }
                Err(e) => {
                    metrics::record_dispatch("failed");
                    tracing::debug!(
                        connection_id = %conn.id(),
                        user_id = user_id,
                        error = %e,
                        "Event delivery failed"
                    );
                    report.failed.push((conn.id().clone(), e));
                }
            }
        }

        Ok(report)
    }

    /// Fire-and-forget variant for low-value events (typing indicators and
    /// the like). Failures are logged, never propagated.
    pub fn dispatch_best_effort(&self, user_id: UserId, event: AgentEvent) {
        match self.dispatch(user_id, event) {
            Ok(report) if !report.is_complete() => {
                tracing::debug!(
                    user_id = user_id,
                    failed = report.failed.len(),
                    "Best-effort dispatch partially failed"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(user_id = user_id, error = %e, "Best-effort dispatch failed");
            }
        }
    }
}

/// Drive an event source into the router until the source ends or shutdown
/// is signalled. This is the sole entry point the excluded agent engine's
/// stream feeds.
pub async fn run_event_pump<S: EventSource>(
    router: Arc<EventDispatchRouter>,
    mut source: S,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            next = source.next_event() => {
                match next {
                    Some((user_id, event)) => {
                        let _ = router.dispatch(user_id, event);
                    }
                    None => {
                        tracing::info!("Event source ended");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("Event pump stopping");
                break;
            }
        }
    }
}
