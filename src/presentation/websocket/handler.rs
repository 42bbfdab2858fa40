//! WebSocket Connection Handler
//!
//! Drives one socket through the full connection lifecycle: Hello, bounded
//! Identify handshake, registration, heartbeat/presence attachment, main
//! message loop, and drained teardown.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use super::messages::{ClientFrame, IdentifyPayload, OpCode, ServerFrame};
use crate::application::presence::PresenceCoordinator;
use crate::domain::{CloseReason, Connection, OutboundMessage};
use crate::infrastructure::metrics;
use crate::startup::GatewayContext;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<GatewayContext>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// Handle one WebSocket connection from accept to close
async fn handle_socket(socket: WebSocket, ctx: GatewayContext) {
    // Split socket for concurrent read/write
    let (mut sink, mut stream) = socket.split();

    // Hello goes out before anything else; the client answers with Identify
    let hello = ServerFrame::hello(ctx.settings.heartbeat.interval_secs * 1000);
    if send_frame(&mut sink, &hello).await.is_err() {
        tracing::debug!("Socket gone before Hello");
        return;
    }

    // Bounded handshake: an Identify that never arrives must not leave a
    // connection stuck in the connecting state forever
    let handshake_timeout = Duration::from_secs(ctx.settings.gateway.handshake_timeout_secs);
    let identify = match timeout(handshake_timeout, await_identify(&mut stream)).await {
        Ok(Some(identify)) => identify,
        Ok(None) => {
            tracing::debug!("Connection closed before Identify");
            return;
        }
        Err(_) => {
            tracing::debug!("Identify timeout");
            let _ = send_frame(&mut sink, &ServerFrame::invalid_session()).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    // Authenticate before the lifecycle begins; failures never reach
    // the connecting state
    let identity = match ctx.authenticator.authenticate(&identify.token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(error = %e, "Invalid token");
            let _ = send_frame(&mut sink, &ServerFrame::invalid_session()).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    // Create the outbound queue and the connection itself
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let conn = match ctx
        .registry
        .begin_handshake(identity.user_id, identify.capabilities, tx)
    {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(user_id = identity.user_id, error = %e, "Handshake rejected");
            let _ = send_frame(&mut sink, &ServerFrame::invalid_session()).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    if let Err(e) = conn.complete_handshake() {
        tracing::error!(connection_id = %conn.id(), error = %e, "Handshake completion failed");
        conn.finalize_close();
        return;
    }

    if let Err(e) = ctx.registry.register(conn.clone()) {
        tracing::error!(connection_id = %conn.id(), error = %e, "Registration failed");
        conn.request_close(CloseReason::TransportError);
        conn.finalize_close();
        return;
    }

    // Ready goes out before the writer task takes the sink, so it is
    // guaranteed to precede any dispatched event
    let ready = ServerFrame::ready(conn.id(), identity.user_id);
    if send_frame(&mut sink, &ready).await.is_err() {
        ctx.registry.deregister(conn.id());
        conn.request_close(CloseReason::TransportError);
        conn.finalize_close();
        return;
    }

    ctx.heartbeat.watch(&conn);
    ctx.presence.on_connection_added(identity.user_id, conn.id());

    tracing::info!(
        user_id = identity.user_id,
        connection_id = %conn.id(),
        "User connected and identified"
    );

    // Writer task: drains the outbound queue in FIFO order, preserving the
    // per-connection ordering guarantee
    let mut writer = tokio::spawn(async move {
        let mut sequence: u64 = 0;
        while let Some(msg) = rx.recv().await {
            let frame = match msg {
                OutboundMessage::Ping => ServerFrame::ping(),
                OutboundMessage::HeartbeatAck => ServerFrame::heartbeat_ack(),
                OutboundMessage::Event(event) => {
                    sequence += 1;
                    ServerFrame::dispatch(sequence, &event)
                }
                OutboundMessage::Close(_) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Main message loop
    let mut close_reason = CloseReason::ClientDisconnect;
    let mut writer_done = false;
    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, &conn, &ctx.presence);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %conn.id(), "Connection closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Transport-level frames still prove liveness
                        conn.record_activity();
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %conn.id(), error = %e, "WebSocket error");
                        close_reason = CloseReason::TransportError;
                        break;
                    }
                }
            }

            // Writer exit means a close frame went out (supervisor-initiated
            // or requested) or the transport died
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    // Teardown: deregister first so lookups stop resolving this connection,
    // then drain the writer within the configured bound
    ctx.registry.deregister(conn.id());
    ctx.presence.on_connection_removed(identity.user_id, conn.id());
    ctx.heartbeat.forget(conn.id());
    conn.request_close(close_reason);

    if !writer_done {
        let drain = Duration::from_secs(ctx.settings.gateway.drain_timeout_secs);
        if timeout(drain, &mut writer).await.is_err() {
            tracing::warn!(connection_id = %conn.id(), "Drain timeout, force-closing");
            writer.abort();
        }
    }
    conn.finalize_close();
    metrics::record_connection_closed(
        conn.close_reason()
            .unwrap_or(CloseReason::ClientDisconnect)
            .as_str(),
    );

    tracing::info!(
        user_id = identity.user_id,
        connection_id = %conn.id(),
        "User disconnected"
    );
}

/// Read frames until a well-formed Identify arrives or the stream ends
async fn await_identify(stream: &mut SplitStream<WebSocket>) -> Option<IdentifyPayload> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else {
                    continue;
                };
                if frame.op == OpCode::Identify as u8 {
                    if let Some(d) = frame.d {
                        if let Ok(identify) = serde_json::from_value::<IdentifyPayload>(d) {
                            return Some(identify);
                        }
                    }
                }
            }
            Ok(Message::Close(_)) => return None,
            Err(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Handle one inbound frame on an established connection
fn handle_frame(text: &str, conn: &Connection, presence: &PresenceCoordinator) {
    // Any inbound bytes are proof of life, parseable or not
    conn.record_activity();
    presence.touch(conn.user_id());

    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        tracing::debug!(connection_id = %conn.id(), "Unparseable frame");
        return;
    };

    match frame.op {
        op if op == OpCode::Heartbeat as u8 => {
            conn.record_heartbeat_ack();
            let _ = conn.send(OutboundMessage::HeartbeatAck);
            tracing::trace!(connection_id = %conn.id(), "Heartbeat received");
        }

        op if op == OpCode::HeartbeatAck as u8 => {
            // Pong for a server-initiated ping
            conn.record_heartbeat_ack();
        }

        op if op == OpCode::Identify as u8 => {
            // Double-accept protection: the handshake already completed, so
            // this must fail loudly instead of silently re-running
            if let Err(e) = conn.complete_handshake() {
                tracing::error!(
                    connection_id = %conn.id(),
                    error = %e,
                    "Duplicate Identify rejected"
                );
            }
        }

        op => {
            tracing::debug!(connection_id = %conn.id(), op = op, "Unknown opcode");
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_default();
    sink.send(Message::Text(text.into())).await
}
