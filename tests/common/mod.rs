//! Shared helpers for integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use chat_gateway::config::HeartbeatSettings;
use chat_gateway::domain::events::MessageCreateEvent;
use chat_gateway::domain::{AgentEvent, Connection, OutboundMessage, UserId};
use chat_gateway::infrastructure::ConnectionRegistry;

pub fn registry(limit: usize) -> Arc<ConnectionRegistry> {
    Arc::new(ConnectionRegistry::new(limit))
}

/// Run a connection through the full handshake and register it, returning
/// the connection and the receiving end of its outbound queue.
pub fn connect(
    registry: &ConnectionRegistry,
    user_id: UserId,
) -> (Arc<Connection>, mpsc::UnboundedReceiver<OutboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = registry
        .begin_handshake(user_id, HashMap::new(), tx)
        .expect("handshake admitted");
    conn.complete_handshake().expect("identify");
    registry.register(conn.clone()).expect("register");
    (conn, rx)
}

pub fn heartbeat_settings(interval_secs: u64, timeout_secs: u64, max_missed: u32) -> HeartbeatSettings {
    HeartbeatSettings {
        interval_secs,
        timeout_secs,
        max_missed,
        cleanup_interval_secs: 3600,
        stale_after_secs: 7200,
    }
}

pub fn message_event(content: &str) -> AgentEvent {
    AgentEvent::MessageCreate(MessageCreateEvent {
        id: "m1".into(),
        conversation_id: "conv-1".into(),
        role: "assistant".into(),
        content: content.into(),
        timestamp: "2026-01-01T00:00:00Z".into(),
    })
}

/// Count messages currently queued on a connection's outbound channel.
pub fn drain_queued(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}
