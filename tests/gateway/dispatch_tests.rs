//! Event dispatch isolation and delivery reporting.

use pretty_assertions::assert_eq;

use chat_gateway::application::EventDispatchRouter;
use chat_gateway::domain::{CloseReason, OutboundMessage};

use crate::common;

#[tokio::test]
async fn dispatch_reaches_every_connection_of_the_user() {
    let registry = common::registry(10);
    let router = EventDispatchRouter::new(registry.clone());

    let (_c1, mut rx1) = common::connect(&registry, 1);
    let (_c2, mut rx2) = common::connect(&registry, 1);

    let report = router.dispatch(1, common::message_event("hello")).unwrap();
    assert_eq!(report.delivered.len(), 2);
    assert!(report.is_complete());

    assert_eq!(common::drain_queued(&mut rx1).len(), 1);
    assert_eq!(common::drain_queued(&mut rx2).len(), 1);
}

#[tokio::test]
async fn dispatch_never_crosses_users() {
    let registry = common::registry(10);
    let router = EventDispatchRouter::new(registry.clone());

    let (_alice, mut alice_rx) = common::connect(&registry, 1);
    let (_bob, mut bob_rx) = common::connect(&registry, 2);

    let report = router.dispatch(1, common::message_event("for alice")).unwrap();
    assert_eq!(report.delivered.len(), 1);

    assert_eq!(common::drain_queued(&mut alice_rx).len(), 1);
    // Bob's queue saw nothing
    assert!(common::drain_queued(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn dispatch_to_offline_user_delivers_nothing() {
    let registry = common::registry(10);
    let router = EventDispatchRouter::new(registry.clone());

    let report = router.dispatch(5, common::message_event("void")).unwrap();
    assert!(!report.delivered_any());
    assert!(report.is_complete());
}

#[tokio::test]
async fn partial_failure_is_reported_not_raised() {
    let registry = common::registry(10);
    let router = EventDispatchRouter::new(registry.clone());

    let (_healthy, mut healthy_rx) = common::connect(&registry, 1);
    let (closing, _closing_rx) = common::connect(&registry, 1);
    closing.request_close(CloseReason::ClientDisconnect);

    let report = router.dispatch(1, common::message_event("partial")).unwrap();
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.delivered_any());
    assert!(!report.is_complete());

    let queued = common::drain_queued(&mut healthy_rx);
    assert!(matches!(queued.as_slice(), [OutboundMessage::Event(_)]));
}

#[tokio::test]
async fn events_arrive_in_dispatch_order() {
    let registry = common::registry(10);
    let router = EventDispatchRouter::new(registry.clone());
    let (_conn, mut rx) = common::connect(&registry, 1);

    for i in 0..5 {
        router
            .dispatch(1, common::message_event(&format!("msg-{i}")))
            .unwrap();
    }

    let queued = common::drain_queued(&mut rx);
    let contents: Vec<String> = queued
        .into_iter()
        .filter_map(|msg| match msg {
            OutboundMessage::Event(chat_gateway::domain::AgentEvent::MessageCreate(e)) => {
                Some(e.content)
            }
            _ => None,
        })
        .collect();
    assert_eq!(contents, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
}

mod pump {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::sync::watch;

    use chat_gateway::application::{run_event_pump, EventDispatchRouter};
    use chat_gateway::domain::{AgentEvent, EventSource, UserId};

    use crate::common;

    /// Scripted event source standing in for the agent execution engine.
    struct ScriptedSource {
        events: VecDeque<(UserId, AgentEvent)>,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn next_event(&mut self) -> Option<(UserId, AgentEvent)> {
            self.events.pop_front()
        }
    }

    #[tokio::test]
    async fn pump_routes_until_the_source_ends() {
        let registry = common::registry(10);
        let router = Arc::new(EventDispatchRouter::new(registry.clone()));

        let (_alice, mut alice_rx) = common::connect(&registry, 1);
        let (_bob, mut bob_rx) = common::connect(&registry, 2);

        let source = ScriptedSource {
            events: VecDeque::from([
                (1, common::message_event("a1")),
                (2, common::message_event("b1")),
                (1, common::message_event("a2")),
            ]),
        };

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        run_event_pump(router, source, shutdown_rx).await;

        assert_eq!(common::drain_queued(&mut alice_rx).len(), 2);
        assert_eq!(common::drain_queued(&mut bob_rx).len(), 1);
    }
}

#[tokio::test]
async fn best_effort_dispatch_swallows_failures() {
    let registry = common::registry(10);
    let router = EventDispatchRouter::new(registry.clone());

    let (_healthy, mut healthy_rx) = common::connect(&registry, 1);
    let (closing, _closing_rx) = common::connect(&registry, 1);
    closing.request_close(CloseReason::ClientDisconnect);

    // Returns unit whatever happens; the healthy connection still gets
    // the event
    router.dispatch_best_effort(1, common::message_event("typing"));
    router.dispatch_best_effort(99, common::message_event("nobody home"));

    assert_eq!(common::drain_queued(&mut healthy_rx).len(), 1);
}
