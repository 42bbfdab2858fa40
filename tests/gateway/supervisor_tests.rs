//! Heartbeat supervisor behavior under virtual time.
//!
//! All tests run with the clock paused so tick scheduling is deterministic.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::time::Duration;

use chat_gateway::application::{HeartbeatSupervisor, PresenceCoordinator};
use chat_gateway::domain::{CloseReason, ConnectionState, OutboundMessage, PresenceSignal};

use crate::common;

/// Advance the paused clock and give the supervisor task a chance to run.
async fn advance(secs: u64) {
    // Let freshly spawned tasks register their timers before the clock moves;
    // tokio::time::advance jumps the clock before yielding.
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(secs)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn silent_connection_degrades_then_closes() {
    let registry = common::registry(10);
    let presence = Arc::new(PresenceCoordinator::new(registry.clone()));
    let supervisor = Arc::new(HeartbeatSupervisor::new(
        registry.clone(),
        presence.clone(),
        common::heartbeat_settings(5, 2, 2),
    ));

    let (conn, mut rx) = common::connect(&registry, 1);
    supervisor.watch(&conn);
    presence.on_connection_added(1, conn.id());
    let mut signals = presence.subscribe();

    let closed_before = chat_gateway::infrastructure::metrics::CONNECTIONS_CLOSED_TOTAL
        .with_label_values(&["heartbeat_exhausted"])
        .get();

    let handle = supervisor.spawn();

    // First tick pings; the client never answers
    advance(5).await;
    assert_eq!(conn.state(), ConnectionState::Active);

    // Second tick: the ping timed out, first miss
    advance(5).await;
    assert_eq!(conn.state(), ConnectionState::Degraded);
    assert_eq!(conn.missed_heartbeats(), 1);
    assert_eq!(supervisor.is_alive(conn.id()), Some(false));

    // Third tick: second miss exhausts the budget
    advance(5).await;
    assert_eq!(conn.state(), ConnectionState::Closing);
    assert_eq!(conn.close_reason(), Some(CloseReason::HeartbeatExhausted));

    // The supervisor tore down all bookkeeping
    assert!(registry.lookup(conn.id()).is_none());
    assert_eq!(supervisor.is_alive(conn.id()), None);
    assert!(!presence.is_online(1));
    assert_eq!(
        signals.try_recv().unwrap(),
        PresenceSignal::UserWentOffline(1)
    );

    // The writer was told to emit a close frame after the pings
    let queued = common::drain_queued(&mut rx);
    assert!(matches!(
        queued.last(),
        Some(OutboundMessage::Close(CloseReason::HeartbeatExhausted))
    ));
    assert_eq!(
        queued
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Ping))
            .count(),
        2
    );

    // Close accounting belongs to the socket handler's teardown, not the
    // supervisor; expiring here must not bump the counter
    let closed_after = chat_gateway::infrastructure::metrics::CONNECTIONS_CLOSED_TOTAL
        .with_label_values(&["heartbeat_exhausted"])
        .get();
    assert_eq!(closed_after, closed_before);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn inbound_activity_counts_as_liveness_proof() {
    let registry = common::registry(10);
    let presence = Arc::new(PresenceCoordinator::new(registry.clone()));
    let supervisor = Arc::new(HeartbeatSupervisor::new(
        registry.clone(),
        presence.clone(),
        common::heartbeat_settings(5, 2, 2),
    ));

    let (conn, mut rx) = common::connect(&registry, 1);
    supervisor.watch(&conn);
    let handle = supervisor.spawn();

    // A chatty connection that never pongs but keeps sending messages
    for _ in 0..4 {
        advance(4).await;
        conn.record_activity();
        advance(1).await;
    }

    assert_eq!(conn.state(), ConnectionState::Active);
    assert_eq!(conn.missed_heartbeats(), 0);
    assert_eq!(supervisor.is_alive(conn.id()), Some(true));
    assert!(registry.lookup(conn.id()).is_some());

    // Pings kept flowing the whole time
    let pings = common::drain_queued(&mut rx)
        .iter()
        .filter(|m| matches!(m, OutboundMessage::Ping))
        .count();
    assert_eq!(pings, 4);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_ack_recovers_a_degraded_connection() {
    let registry = common::registry(10);
    let presence = Arc::new(PresenceCoordinator::new(registry.clone()));
    let supervisor = Arc::new(HeartbeatSupervisor::new(
        registry.clone(),
        presence.clone(),
        common::heartbeat_settings(5, 2, 3),
    ));

    let (conn, _rx) = common::connect(&registry, 1);
    supervisor.watch(&conn);
    let handle = supervisor.spawn();

    advance(5).await; // ping
    advance(5).await; // miss
    assert_eq!(conn.state(), ConnectionState::Degraded);

    // A late pong arrives; the connection recovers fully
    advance(1).await;
    conn.record_heartbeat_ack();
    assert_eq!(conn.state(), ConnectionState::Active);
    assert_eq!(conn.missed_heartbeats(), 0);

    advance(5).await;
    assert_eq!(conn.state(), ConnectionState::Active);
    assert_eq!(supervisor.is_alive(conn.id()), Some(true));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sweep_reclaims_records_for_vanished_connections() {
    let registry = common::registry(10);
    let presence = Arc::new(PresenceCoordinator::new(registry.clone()));
    let settings = chat_gateway::config::HeartbeatSettings {
        interval_secs: 3600,
        timeout_secs: 10,
        max_missed: 3,
        cleanup_interval_secs: 30,
        stale_after_secs: 60,
    };
    let supervisor = Arc::new(HeartbeatSupervisor::new(
        registry.clone(),
        presence.clone(),
        settings,
    ));

    let (conn, _rx) = common::connect(&registry, 1);
    supervisor.watch(&conn);
    assert_eq!(supervisor.record_count(), 1);

    // An interrupted close path deregistered the connection but never
    // called forget()
    registry.deregister(conn.id());

    let handle = supervisor.spawn();
    advance(30).await;
    assert_eq!(supervisor.record_count(), 0);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn supervisor_skips_non_routable_connections() {
    let registry = common::registry(10);
    let presence = Arc::new(PresenceCoordinator::new(registry.clone()));
    let supervisor = Arc::new(HeartbeatSupervisor::new(
        registry.clone(),
        presence.clone(),
        common::heartbeat_settings(5, 2, 2),
    ));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let conn = registry
        .begin_handshake(1, std::collections::HashMap::new(), tx)
        .unwrap();
    conn.complete_handshake().unwrap();
    registry.register(conn.clone()).unwrap();
    supervisor.watch(&conn);
    // Force it back to a non-routable state via a close request
    conn.request_close(CloseReason::ServerShutdown);
    let _ = common::drain_queued(&mut rx);

    let handle = supervisor.spawn();
    advance(5).await;
    advance(5).await;
    advance(5).await;

    // No pings and no miss accounting for a non-routable connection
    assert!(common::drain_queued(&mut rx).is_empty());
    assert_eq!(conn.missed_heartbeats(), 0);

    handle.shutdown().await;
}
