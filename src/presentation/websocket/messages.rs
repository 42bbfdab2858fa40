//! WebSocket Message Types
//!
//! Gateway wire frame formats for the agent-chat protocol.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::AgentEvent;

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch
    Dispatch = 0,
    /// Client-initiated heartbeat
    Heartbeat = 1,
    /// Identify (handshake credential)
    Identify = 2,
    /// Server-initiated liveness probe
    Ping = 3,
    /// Reconnect request
    Reconnect = 7,
    /// Invalid session
    InvalidSession = 9,
    /// Hello
    Hello = 10,
    /// Heartbeat ACK (reply to Heartbeat, or client pong to Ping)
    HeartbeatAck = 11,
}

/// Incoming gateway frame
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub op: u8,
    pub d: Option<serde_json::Value>,
}

/// Outgoing gateway frame
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl ServerFrame {
    pub fn hello(heartbeat_interval_ms: u64) -> Self {
        Self {
            op: OpCode::Hello as u8,
            d: serde_json::to_value(HelloPayload {
                heartbeat_interval: heartbeat_interval_ms,
            })
            .ok(),
            s: None,
            t: None,
        }
    }

    pub fn ready(connection_id: &str, user_id: i64) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: serde_json::to_value(ReadyPayload {
                v: 1,
                connection_id: connection_id.to_owned(),
                user_id: user_id.to_string(),
            })
            .ok(),
            s: Some(0),
            t: Some("READY".to_string()),
        }
    }

    pub fn dispatch(sequence: u64, event: &AgentEvent) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: Some(event.to_json()),
            s: Some(sequence),
            t: Some(event.event_name().to_string()),
        }
    }

    pub fn ping() -> Self {
        Self {
            op: OpCode::Ping as u8,
            d: None,
            s: None,
            t: None,
        }
    }

    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck as u8,
            d: None,
            s: None,
            t: None,
        }
    }

    pub fn invalid_session() -> Self {
        Self {
            op: OpCode::InvalidSession as u8,
            d: Some(serde_json::Value::Bool(false)),
            s: None,
            t: None,
        }
    }
}

/// Hello payload (op 10)
#[derive(Debug, Serialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Ready payload (dispatch READY)
#[derive(Debug, Serialize)]
pub struct ReadyPayload {
    pub v: u8,
    pub connection_id: String,
    pub user_id: String,
}

/// Identify payload (op 2)
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    /// Client capabilities carried onto the connection as subprotocol
    /// metadata
    #[serde(default)]
    pub capabilities: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{AgentEvent, MessageDeltaEvent};
    use pretty_assertions::assert_eq;

    #[test]
    fn hello_carries_interval() {
        let frame = ServerFrame::hello(30000);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["op"], OpCode::Hello as u8);
        assert_eq!(json["d"]["heartbeat_interval"], 30000);
    }

    #[test]
    fn dispatch_frame_carries_sequence_and_name() {
        let event = AgentEvent::MessageDelta(MessageDeltaEvent {
            id: "m1".into(),
            conversation_id: "conv-1".into(),
            delta: "tok".into(),
        });
        let frame = ServerFrame::dispatch(7, &event);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["op"], 0);
        assert_eq!(json["s"], 7);
        assert_eq!(json["t"], "MESSAGE_DELTA");
    }

    #[test]
    fn identify_defaults_empty_capabilities() {
        let payload: IdentifyPayload =
            serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert!(payload.capabilities.is_empty());
    }
}
