// tests/integration/hub_test.rs

//! Integration tests for the hub event loop
//! Tests: registration, filtered fan-out, backpressure eviction, idempotent
//! unregister, liveness, and shutdown.

use super::test_helpers::{RECV_TIMEOUT, TestContext, init_tracing};
use axum::extract::ws::Message;
use futures::StreamExt;
use futures::channel::mpsc as fmpsc;
use liveresult::config::ConnectionConfig;
use liveresult::connection::ConnectionHandler;
use liveresult::core::hub::{Hub, HubConfig};
use liveresult::core::protocol::{LiveMessage, MessageFilter, MessageKind, SubscriptionKind};
use liveresult::core::session::SessionId;
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast;

fn update(kind: MessageKind, filter: Option<MessageFilter>) -> LiveMessage {
    LiveMessage::new(kind, Some(json!({ "n": 1 })), filter)
}

// ===== Routing =====

#[tokio::test]
async fn test_region_subscription_scenario() {
    let ctx = TestContext::new().await;
    let mut a = ctx
        .connect_with(&[(SubscriptionKind::ByRegion, MessageFilter::region("Bandung"))])
        .await;

    assert!(ctx.hub.broadcast(update(
        MessageKind::RegionUpdate,
        Some(MessageFilter::region("Jakarta"))
    )));
    assert!(ctx.hub.broadcast(update(
        MessageKind::RegionUpdate,
        Some(MessageFilter::region("Bandung"))
    )));
    ctx.fence();

    let received = a.recv_until_fence().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["type"], "region_update");
    assert_eq!(received[0]["filter"]["region"], "Bandung");
}

#[tokio::test]
async fn test_statistics_fanout_to_hundred_sessions() {
    let ctx = TestContext::new().await;

    let mut clients = Vec::new();
    for i in 0..100 {
        let subs = match i % 4 {
            0 => vec![(SubscriptionKind::Statistics, MessageFilter::default())],
            1 => vec![(SubscriptionKind::All, MessageFilter::default())],
            2 => vec![(SubscriptionKind::ByRegion, MessageFilter::region("Bandung"))],
            _ => vec![],
        };
        clients.push((i % 4, ctx.connect_with(&subs).await));
    }
    assert_eq!(ctx.hub.client_count(), 100);

    ctx.service.broadcast_statistics_update().await.unwrap();
    ctx.fence();

    for (group, client) in clients.iter_mut() {
        let received = client.recv_until_fence().await;
        if *group <= 1 {
            assert_eq!(received.len(), 1, "group {group} should get one update");
            assert_eq!(received[0]["type"], "statistics_update");
        } else {
            assert!(received.is_empty(), "group {group} should get nothing");
        }
    }
}

#[tokio::test]
async fn test_unsubscribed_session_only_sees_heartbeats() {
    let ctx = TestContext::new().await;
    let mut idle = ctx.connect().await;

    for kind in [
        MessageKind::VoteUpdate,
        MessageKind::ElectionUpdate,
        MessageKind::RegionUpdate,
        MessageKind::StatisticsUpdate,
    ] {
        assert!(ctx.hub.broadcast(update(kind, None)));
    }
    ctx.fence();
    assert!(idle.recv_until_fence().await.is_empty());
}

#[tokio::test]
async fn test_per_session_order_matches_enqueue_order() {
    let ctx = TestContext::new().await;
    let mut client = ctx
        .connect_with(&[(SubscriptionKind::All, MessageFilter::default())])
        .await;

    for n in 0..20 {
        let msg = LiveMessage::new(MessageKind::StatisticsUpdate, Some(json!({ "n": n })), None);
        assert!(ctx.hub.broadcast(msg));
    }
    ctx.fence();

    let received = client.recv_until_fence().await;
    let order: Vec<i64> = received
        .iter()
        .map(|m| m["data"]["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, (0..20).collect::<Vec<_>>());
}

// ===== Backpressure =====

#[tokio::test]
async fn test_saturated_session_is_evicted() {
    let ctx = TestContext::with_config(HubConfig {
        session_queue_capacity: 2,
        ..Default::default()
    })
    .await;

    let mut healthy = ctx
        .connect_with(&[(SubscriptionKind::All, MessageFilter::default())])
        .await;
    let slow = ctx
        .connect_with(&[(SubscriptionKind::All, MessageFilter::default())])
        .await;
    assert_eq!(ctx.hub.client_count(), 2);

    // The slow client never drains: two fill its queue, the third overflows it.
    for _ in 0..3 {
        assert!(ctx.hub.broadcast(update(MessageKind::StatisticsUpdate, None)));
        healthy.recv().await;
    }

    ctx.wait_for_clients(1).await;
    assert!(!ctx.hub.registry().contains(slow.session.id()));
    assert!(slow.session.is_closed());
    assert_eq!(ctx.service.get_connected_clients(), 1);
}

#[tokio::test]
async fn test_broadcast_queue_overflow_drops_update() {
    init_tracing();
    // The loop is never started, so nothing drains the broadcast queue.
    let (hub, _hub_loop) = Hub::new(&HubConfig {
        broadcast_queue_capacity: 4,
        ..Default::default()
    });
    let accepted = (0..10)
        .filter(|_| hub.broadcast(update(MessageKind::StatisticsUpdate, None)))
        .count();
    assert_eq!(accepted, 4);
}

// ===== Unregister =====

#[tokio::test]
async fn test_double_unregister_is_noop() {
    let ctx = TestContext::new().await;
    let mut client = ctx.connect().await;
    let id = client.session.id().clone();

    ctx.hub.unregister(&id);
    ctx.hub.unregister(&id);
    ctx.hub.unregister(&SessionId::from("never-registered"));

    ctx.wait_for_clients(0).await;
    assert!(client.drain_until_closed().await.is_empty());

    // The loop is still alive and accepting sessions.
    let _other = ctx.connect().await;
    assert_eq!(ctx.hub.client_count(), 1);
}

#[tokio::test]
async fn test_register_then_immediately_unregister() {
    let ctx = TestContext::new().await;
    for _ in 0..50 {
        let (session, _rx) = ctx.hub.open_session();
        let id = session.id().clone();
        ctx.hub.register(session).await.unwrap();
        ctx.hub.unregister(&id);
        ctx.hub.unregister(&id);
    }
    ctx.wait_for_clients(0).await;
}

// ===== Shutdown =====

#[tokio::test]
async fn test_shutdown_closes_every_session() {
    let mut ctx = TestContext::new().await;
    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(
            ctx.connect_with(&[(SubscriptionKind::All, MessageFilter::default())])
                .await,
        );
    }
    // A concurrent unregister for one of them must not trip the shutdown path.
    ctx.hub.unregister(clients[0].session.id());

    ctx.shutdown().await;
    assert!(ctx.is_stopped());
    assert_eq!(ctx.hub.client_count(), 0);
    assert_eq!(ctx.service.get_connected_clients(), 0);

    for client in clients.iter_mut() {
        client.drain_until_closed().await;
        assert!(client.session.is_closed());
    }

    // Late callers get clean failures, not panics.
    assert!(!ctx.hub.broadcast(update(MessageKind::StatisticsUpdate, None)));
    let (late, _rx) = ctx.hub.open_session();
    assert!(ctx.hub.register(late).await.is_err());
}

#[tokio::test]
async fn test_connection_tasks_end_after_shutdown() {
    const CONNECTIONS: usize = 20;
    let mut ctx = TestContext::new().await;

    // Peers stay connected and silent; only the hub going away can end a task.
    let mut peers = Vec::new();
    let mut written = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..CONNECTIONS {
        let handler = ConnectionHandler::new(ctx.hub.clone(), ConnectionConfig::default());
        let (sink, sink_rx) = fmpsc::unbounded::<Message>();
        let (peer_tx, stream) = fmpsc::unbounded::<Result<Message, String>>();
        tasks.push(tokio::spawn(handler.serve(sink, stream)));
        peers.push(peer_tx);
        written.push(sink_rx);
    }
    ctx.wait_for_clients(CONNECTIONS).await;

    ctx.shutdown().await;

    for task in tasks {
        tokio::time::timeout(RECV_TIMEOUT, task)
            .await
            .expect("connection task outlived the hub")
            .unwrap();
    }
    assert_eq!(ctx.hub.client_count(), 0);
    assert_eq!(ctx.service.get_connected_clients(), 0);

    for mut rx in written {
        let mut closed = false;
        while let Some(message) = rx.next().await {
            closed = matches!(message, Message::Close(_));
        }
        assert!(closed, "last frame written should be a close");
    }
    drop(peers);
}

#[tokio::test]
async fn test_shutdown_when_sender_dropped() {
    init_tracing();
    let (hub, hub_loop) = Hub::new(&HubConfig::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let task = tokio::spawn(hub_loop.run(shutdown_rx));
    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("loop should stop when the shutdown sender is dropped")
        .unwrap();
    assert_eq!(hub.client_count(), 0);
}

// ===== Liveness =====

#[tokio::test(start_paused = true)]
async fn test_heartbeat_and_stale_eviction() {
    let ctx = TestContext::with_config(HubConfig {
        heartbeat_interval: Duration::from_secs(30),
        stale_threshold: Duration::from_secs(120),
        ..Default::default()
    })
    .await;
    let mut active = ctx.connect().await;
    let mut quiet = ctx.connect().await;

    // Past the first tick; everyone gets a heartbeat with the client count.
    tokio::time::sleep(Duration::from_secs(31)).await;
    let beat = quiet.rx.try_recv().expect("heartbeat should be queued");
    let beat: serde_json::Value = serde_json::from_str(&beat).unwrap();
    assert_eq!(beat["type"], "heartbeat");
    assert_eq!(beat["data"]["status"], "alive");
    assert_eq!(beat["data"]["clients"], 2);

    tokio::time::sleep(Duration::from_secs(59)).await;
    active.session.touch();

    // At 100s neither has been idle past the threshold.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ctx.hub.client_count(), 2);

    // The tick at 150s sees `quiet` idle for 150s and `active` for 60s.
    tokio::time::sleep(Duration::from_secs(55)).await;
    assert_eq!(ctx.hub.client_count(), 1);
    assert!(ctx.hub.registry().contains(active.session.id()));
    assert!(quiet.session.is_closed());

    while active.rx.try_recv().is_ok() {}
}
