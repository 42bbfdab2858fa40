//! Presence coordinator behavior across multiple connections per user.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use chat_gateway::application::PresenceCoordinator;
use chat_gateway::domain::PresenceSignal;

use crate::common;

#[tokio::test]
async fn one_online_signal_for_three_connections() {
    let registry = common::registry(10);
    let presence = PresenceCoordinator::new(registry.clone());
    let mut signals = presence.subscribe();

    let conns: Vec<_> = (0..3).map(|_| common::connect(&registry, 7)).collect();
    for (conn, _) in &conns {
        presence.on_connection_added(7, conn.id());
    }

    assert!(presence.is_online(7));
    assert_eq!(
        signals.try_recv().unwrap(),
        PresenceSignal::UserCameOnline(7)
    );
    // No further signals for the second and third connections
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn one_offline_signal_when_last_connection_leaves() {
    let registry = common::registry(10);
    let presence = PresenceCoordinator::new(registry.clone());

    let conns: Vec<_> = (0..3).map(|_| common::connect(&registry, 7)).collect();
    for (conn, _) in &conns {
        presence.on_connection_added(7, conn.id());
    }

    let mut signals = presence.subscribe();
    presence.on_connection_removed(7, conns[0].0.id());
    presence.on_connection_removed(7, conns[1].0.id());
    assert!(presence.is_online(7));
    assert!(signals.try_recv().is_err());

    presence.on_connection_removed(7, conns[2].0.id());
    assert!(!presence.is_online(7));
    assert_eq!(
        signals.try_recv().unwrap(),
        PresenceSignal::UserWentOffline(7)
    );
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn duplicate_removal_does_not_signal_twice() {
    let registry = common::registry(10);
    let presence = PresenceCoordinator::new(registry.clone());
    let (conn, _rx) = common::connect(&registry, 7);
    presence.on_connection_added(7, conn.id());

    let mut signals = presence.subscribe();
    presence.on_connection_removed(7, conn.id());
    // Racing teardown paths remove the same connection again
    presence.on_connection_removed(7, conn.id());

    assert_eq!(
        signals.try_recv().unwrap(),
        PresenceSignal::UserWentOffline(7)
    );
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_adds_emit_one_signal() {
    let registry = common::registry(100);
    let presence = Arc::new(PresenceCoordinator::new(registry.clone()));
    let mut signals = presence.subscribe();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let (conn, rx) = common::connect(&registry, 9);
        let presence = presence.clone();
        tasks.push(tokio::spawn(async move {
            presence.on_connection_added(9, conn.id());
            drop(rx);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(presence.is_online(9));
    assert_eq!(
        signals.try_recv().unwrap(),
        PresenceSignal::UserCameOnline(9)
    );
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn inactivity_tracks_the_most_recent_connection() {
    let registry = common::registry(10);
    let presence = PresenceCoordinator::new(registry.clone());
    let (conn, _rx) = common::connect(&registry, 7);
    presence.on_connection_added(7, conn.id());

    conn.record_activity();
    let idle = presence
        .get_inactivity_duration(7)
        .expect("online user has an inactivity duration");
    assert!(idle < std::time::Duration::from_secs(1));

    assert!(presence.get_inactivity_duration(99).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn signals_alternate_under_contention() {
    let presence = Arc::new(PresenceCoordinator::new(common::registry(10)));
    let mut signals = presence.subscribe();

    // Several tasks churn connections for the same user; every transition
    // decision and its signal happen under the user's entry, so subscribers
    // must observe a strict online/offline alternation.
    let mut tasks = Vec::new();
    for t in 0..4 {
        let presence = presence.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                let id = format!("c-{t}-{i}");
                presence.on_connection_added(3, &id);
                presence.on_connection_removed(3, &id);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut expect = PresenceSignal::UserCameOnline(3);
    while let Ok(signal) = signals.try_recv() {
        assert_eq!(signal, expect);
        expect = match expect {
            PresenceSignal::UserCameOnline(id) => PresenceSignal::UserWentOffline(id),
            PresenceSignal::UserWentOffline(id) => PresenceSignal::UserCameOnline(id),
        };
    }
    // Every online got its offline
    assert_eq!(expect, PresenceSignal::UserCameOnline(3));
    assert!(!presence.is_online(3));
}
