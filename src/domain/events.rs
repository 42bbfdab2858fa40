//! Typed gateway events.
//!
//! Events produced by the agent execution engine and chat layer, routed to
//! a user's connections by the dispatch router. The wire layer wraps these
//! in dispatch frames; this module only defines the typed payloads.

use serde::{Deserialize, Serialize};

use crate::domain::connection::CloseReason;

/// Agent/chat event types routed over the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d")]
pub enum AgentEvent {
    // Agent run lifecycle
    #[serde(rename = "AGENT_STARTED")]
    AgentStarted(AgentStartedEvent),
    #[serde(rename = "AGENT_THINKING")]
    AgentThinking(AgentThinkingEvent),
    #[serde(rename = "TOOL_EXECUTING")]
    ToolExecuting(ToolExecutionEvent),
    #[serde(rename = "TOOL_COMPLETED")]
    ToolCompleted(ToolExecutionEvent),
    #[serde(rename = "AGENT_COMPLETED")]
    AgentCompleted(AgentCompletedEvent),
    #[serde(rename = "AGENT_FAILED")]
    AgentFailed(AgentFailedEvent),

    // Chat events
    #[serde(rename = "MESSAGE_CREATE")]
    MessageCreate(MessageCreateEvent),
    #[serde(rename = "MESSAGE_DELTA")]
    MessageDelta(MessageDeltaEvent),

    // Presence-adjacent, low-value events
    #[serde(rename = "TYPING_START")]
    TypingStart(TypingStartEvent),
}

impl AgentEvent {
    /// Get the event name for dispatch framing
    pub fn event_name(&self) -> &'static str {
        match self {
            AgentEvent::AgentStarted(_) => "AGENT_STARTED",
            AgentEvent::AgentThinking(_) => "AGENT_THINKING",
            AgentEvent::ToolExecuting(_) => "TOOL_EXECUTING",
            AgentEvent::ToolCompleted(_) => "TOOL_COMPLETED",
            AgentEvent::AgentCompleted(_) => "AGENT_COMPLETED",
            AgentEvent::AgentFailed(_) => "AGENT_FAILED",
            AgentEvent::MessageCreate(_) => "MESSAGE_CREATE",
            AgentEvent::MessageDelta(_) => "MESSAGE_DELTA",
            AgentEvent::TypingStart(_) => "TYPING_START",
        }
    }

    /// Convert the payload to a JSON value for sending
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AgentEvent::AgentStarted(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::AgentThinking(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::ToolExecuting(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::ToolCompleted(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::AgentCompleted(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::AgentFailed(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::MessageCreate(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::MessageDelta(e) => serde_json::to_value(e).unwrap_or_default(),
            AgentEvent::TypingStart(e) => serde_json::to_value(e).unwrap_or_default(),
        }
    }
}

// Event payload structs

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStartedEvent {
    pub run_id: String,
    pub conversation_id: String,
    pub agent_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentThinkingEvent {
    pub run_id: String,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionEvent {
    pub run_id: String,
    pub conversation_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCompletedEvent {
    pub run_id: String,
    pub conversation_id: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFailedEvent {
    pub run_id: String,
    pub conversation_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreateEvent {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeltaEvent {
    pub id: String,
    pub conversation_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingStartEvent {
    pub conversation_id: String,
    pub user_id: String,
    pub timestamp: i64,
}

/// Message queued on a connection's outbound channel and drained by its
/// writer task. The wire layer turns these into frames.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Server-initiated liveness probe
    Ping,
    /// Acknowledgement of a client heartbeat
    HeartbeatAck,
    /// Typed event dispatch
    Event(AgentEvent),
    /// Tells the writer to emit a close frame and stop
    Close(CloseReason),
}

impl From<AgentEvent> for OutboundMessage {
    fn from(event: AgentEvent) -> Self {
        OutboundMessage::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = AgentEvent::AgentStarted(AgentStartedEvent {
            run_id: "run-1".into(),
            conversation_id: "conv-1".into(),
            agent_name: "researcher".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["t"], "AGENT_STARTED");
        assert_eq!(json["d"]["run_id"], "run-1");
    }

    #[test]
    fn event_name_matches_tag() {
        let event = AgentEvent::MessageDelta(MessageDeltaEvent {
            id: "m1".into(),
            conversation_id: "conv-1".into(),
            delta: "hel".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["t"], event.event_name());
    }
}
