//! Event-notification session integration tests.
//!
//! Drives an `EventSubClient` against the in-memory socket transport:
//! welcome and notification dispatch, server-initiated redirects, the
//! keepalive watchdog, redelivery suppression, subscriptions and teardown
//! cleanup.

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use lw_core::error::LwError;
use lw_services::event_bus::AppEvent;
use lw_services::gate::{run_gated, ActivityGate};
use lw_services::{EventSubClient, EventSubInput};
use lw_socket::testing::{MockConnector, MockPeer, Outbound};
use lw_socket::SocketEvent;

use common::RecordingApi;

async fn connected_client(
    api: Arc<RecordingApi>,
) -> (EventSubClient, Arc<MockConnector>, MockPeer) {
    let (registry, connector) = common::create_test_registry();
    let mut client = EventSubClient::new(registry, api, &common::create_test_config());
    client.connect().await;
    let peer = connector.next_peer().await.expect("no connection attempt");
    common::settle_eventsub(&mut client).await;
    (client, connector, peer)
}

async fn expect_close(peer: &mut MockPeer) -> u16 {
    loop {
        match peer.recv().await {
            Some(Outbound::Close { code, .. }) => return code,
            Some(Outbound::Text(_)) => continue,
            None => panic!("socket was not closed"),
        }
    }
}

// ---- Welcome, notification, redirect ----

#[tokio::test(start_paused = true)]
async fn welcome_notification_and_redirect() {
    let api = RecordingApi::new();
    let (mut client, connector, mut peer) = connected_client(api).await;
    assert_eq!(peer.url, common::EVENTSUB_URL);

    let order = Arc::new(Mutex::new(Vec::new()));
    let o = order.clone();
    client.on("x", move |n| {
        o.lock().push(format!("first:{}", n.event["n"]));
        Ok(())
    });
    let o = order.clone();
    client.on("x", move |n| {
        o.lock().push(format!("second:{}", n.event["n"]));
        Ok(())
    });

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    let session = client.session().expect("no session after welcome");
    assert_eq!(session.session_id, "s1");
    assert_eq!(session.keepalive_timeout, Duration::from_secs(10));
    assert!(client.watchdog_deadline().is_some());

    peer.send_text(common::notification_frame("m2", "x", json!({ "n": 1 })));
    common::settle_eventsub(&mut client).await;
    assert_eq!(*order.lock(), vec!["first:1".to_string(), "second:1".to_string()]);

    peer.send_text(common::reconnect_frame("m3", "s1", "wss://r"));
    common::settle_eventsub(&mut client).await;
    assert_eq!(expect_close(&mut peer).await, 1000);

    let next = connector.next_peer().await.expect("no reconnect");
    assert_eq!(next.url, "wss://r");
    assert_eq!(connector.attempts(), vec![common::EVENTSUB_URL.to_string(), "wss://r".to_string()]);
    assert_eq!(order.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn redirect_carries_subscriptions_into_new_session() {
    let api = RecordingApi::new();
    let (mut client, connector, peer) = connected_client(api.clone()).await;

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    let id = client.subscribe("x", "1", json!({ "broadcaster_user_id": "7" })).await.unwrap();
    assert_eq!(id, "sub-1");
    assert_eq!(api.created()[0].session_id, "s1");

    peer.send_text(common::reconnect_frame("m2", "s1", "wss://r"));
    common::settle_eventsub(&mut client).await;
    let session = client.session().unwrap();
    assert!(session.is_reconnecting);
    assert_eq!(session.reconnect_url.as_deref(), Some("wss://r"));

    let next = connector.next_peer().await.unwrap();
    common::settle_eventsub(&mut client).await;
    next.send_text(common::welcome_frame("m3", "s2", 30));
    common::settle_eventsub(&mut client).await;

    let session = client.session().unwrap();
    assert_eq!(session.session_id, "s2");
    assert!(!session.is_reconnecting);
    assert_eq!(session.active_subscriptions.get("x").map(String::as_str), Some("sub-1"));
    assert_eq!(api.created().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fresh_welcome_after_transport_drop_resets_subscriptions() {
    let api = RecordingApi::new();
    let (mut client, connector, peer) = connected_client(api).await;

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    client.subscribe("x", "1", json!({})).await.unwrap();

    drop(peer);
    common::settle_eventsub(&mut client).await;
    assert!(client.session().is_none());

    let next = connector.next_peer().await.expect("driver did not reconnect");
    assert_eq!(next.url, common::EVENTSUB_URL);
    next.send_text(common::welcome_frame("m2", "s2", 10));
    common::settle_eventsub(&mut client).await;
    assert!(client.session().unwrap().active_subscriptions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropped_redirect_socket_falls_back_to_configured_url() {
    let api = RecordingApi::new();
    let (mut client, connector, peer) = connected_client(api).await;

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    peer.send_text(common::reconnect_frame("m2", "s1", "wss://r"));
    common::settle_eventsub(&mut client).await;

    let redirected = connector.next_peer().await.expect("no redirect connection");
    assert_eq!(redirected.url, "wss://r");
    redirected.send_text(common::welcome_frame("m3", "s2", 10));
    common::settle_eventsub(&mut client).await;
    assert_eq!(client.session().unwrap().session_id, "s2");

    drop(redirected);
    common::settle_eventsub(&mut client).await;
    assert!(client.session().is_none());

    let next = connector.next_peer().await.expect("no reconnect after redirect drop");
    assert_eq!(next.url, common::EVENTSUB_URL);
    assert_eq!(
        connector.attempts(),
        vec![
            common::EVENTSUB_URL.to_string(),
            "wss://r".to_string(),
            common::EVENTSUB_URL.to_string()
        ]
    );
}

// ---- Keepalive watchdog ----

#[tokio::test(start_paused = true)]
async fn keepalive_silence_triggers_exactly_one_reconnect() {
    let api = RecordingApi::new();
    let (mut client, connector, mut peer) = connected_client(api).await;
    let start = tokio::time::Instant::now();

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;

    let input = client.next_event().await.unwrap();
    assert_eq!(input, EventSubInput::KeepaliveExpired);
    assert!(start.elapsed() >= Duration::from_secs(15));
    client.handle_event(input).await;

    assert_eq!(expect_close(&mut peer).await, 1000);
    let next = connector.next_peer().await.unwrap();
    assert_eq!(next.url, common::EVENTSUB_URL);
    common::settle_eventsub(&mut client).await;

    // No welcome on the new socket: the watchdog stays disarmed.
    assert!(client.watchdog_deadline().is_none());
    let quiet = tokio::time::timeout(Duration::from_secs(60), client.next_event()).await;
    assert!(quiet.is_err());
    assert_eq!(connector.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn keepalive_messages_rearm_the_watchdog() {
    let api = RecordingApi::new();
    let (mut client, connector, peer) = connected_client(api).await;

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;

    tokio::time::advance(Duration::from_secs(10)).await;
    peer.send_text(common::keepalive_frame("m2"));
    common::settle_eventsub(&mut client).await;

    tokio::time::advance(Duration::from_secs(12)).await;
    common::settle_eventsub(&mut client).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(client.session_id(), Some("s1"));
}

#[tokio::test(start_paused = true)]
async fn keepalive_timeout_is_clamped() {
    let api = RecordingApi::new();
    let (mut client, _connector, peer) = connected_client(api).await;

    peer.send_text(common::welcome_frame("m1", "s1", 1));
    common::settle_eventsub(&mut client).await;
    assert_eq!(client.session().unwrap().keepalive_timeout, Duration::from_secs(10));
}

// ---- Dispatch ----

#[tokio::test(start_paused = true)]
async fn redelivered_message_id_is_dropped() {
    let api = RecordingApi::new();
    let (mut client, _connector, peer) = connected_client(api).await;
    let count = Arc::new(Mutex::new(0));
    let c = count.clone();
    client.on("x", move |_| {
        *c.lock() += 1;
        Ok(())
    });

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    peer.send_text(common::notification_frame("n1", "x", json!({})));
    peer.send_text(common::notification_frame("n1", "x", json!({})));
    peer.send_text(common::notification_frame("n2", "x", json!({})));
    common::settle_eventsub(&mut client).await;
    assert_eq!(*count.lock(), 2);
}

#[tokio::test(start_paused = true)]
async fn failing_callbacks_do_not_stop_the_rest() {
    let api = RecordingApi::new();
    let (mut client, _connector, peer) = connected_client(api).await;
    let reached = Arc::new(Mutex::new(false));

    client.on("x", |_| anyhow::bail!("handler error"));
    client.on("x", |_| panic!("handler panic"));
    let r = reached.clone();
    client.on("x", move |_| {
        *r.lock() = true;
        Ok(())
    });

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    peer.send_text(common::notification_frame("n1", "x", json!({})));
    common::settle_eventsub(&mut client).await;
    assert!(*reached.lock());
}

#[tokio::test(start_paused = true)]
async fn off_removes_one_callback() {
    let api = RecordingApi::new();
    let (mut client, _connector, peer) = connected_client(api).await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    let a = client.on("x", move |_| {
        s.lock().push("a");
        Ok(())
    });
    let s = seen.clone();
    client.on("x", move |_| {
        s.lock().push("b");
        Ok(())
    });
    assert!(client.off(a));
    assert!(!client.off(a));
    assert_eq!(client.callback_count("x"), 1);

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    peer.send_text(common::notification_frame("n1", "x", json!({})));
    common::settle_eventsub(&mut client).await;
    assert_eq!(*seen.lock(), vec!["b"]);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped() {
    let api = RecordingApi::new();
    let (mut client, connector, peer) = connected_client(api).await;

    peer.send_text("not json");
    peer.send_text(r#"{"metadata":{"message_type":"brand_new"}}"#);
    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    assert_eq!(client.session_id(), Some("s1"));
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn revocation_keeps_subscription_state() {
    let api = RecordingApi::new();
    let (registry, connector) = common::create_test_registry();
    let bus = common::create_test_event_bus();
    let mut events = bus.subscribe();
    let mut client = EventSubClient::new(registry, api, &common::create_test_config())
        .with_event_bus(bus);
    client.connect().await;
    let peer = connector.next_peer().await.unwrap();

    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    client.subscribe("x", "1", json!({})).await.unwrap();

    peer.send_text(common::revocation_frame("m2", "x", "authorization_revoked"));
    common::settle_eventsub(&mut client).await;
    assert!(client.session().unwrap().active_subscriptions.contains_key("x"));

    let mut welcomed = false;
    let mut revoked = None;
    while let Ok(event) = events.try_recv() {
        match event {
            AppEvent::SessionWelcomed { session_id, keepalive_timeout_secs } => {
                assert_eq!(session_id, "s1");
                assert_eq!(keepalive_timeout_secs, 10);
                welcomed = true;
            }
            AppEvent::SubscriptionRevoked { topic, status } => revoked = Some((topic, status)),
            _ => {}
        }
    }
    assert!(welcomed);
    assert_eq!(revoked, Some(("x".to_string(), "authorization_revoked".to_string())));
}

// ---- Subscriptions and cleanup ----

#[tokio::test(start_paused = true)]
async fn subscribe_requires_a_session() {
    let api = RecordingApi::new();
    let (mut client, _connector, _peer) = connected_client(api.clone()).await;
    let result = client.subscribe("x", "1", json!({})).await;
    assert!(matches!(result, Err(LwError::NoSession)));
    assert!(api.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn subscribe_error_is_returned_and_not_tracked() {
    let api = RecordingApi::new();
    let (mut client, _connector, peer) = connected_client(api.clone()).await;
    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;

    api.fail_creates(true);
    let result = client.subscribe("x", "1", json!({})).await;
    assert!(matches!(result, Err(LwError::ServerError { status: 400, .. })));
    assert!(client.session().unwrap().active_subscriptions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_deletes_remote_id() {
    let api = RecordingApi::new();
    let (mut client, _connector, peer) = connected_client(api.clone()).await;
    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;

    client.subscribe("x", "1", json!({})).await.unwrap();
    assert!(client.unsubscribe("x").await.unwrap());
    assert!(!client.unsubscribe("x").await.unwrap());
    assert_eq!(api.deleted(), vec!["sub-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_and_deletes_subscriptions() {
    let api = RecordingApi::new();
    let (mut client, connector, mut peer) = connected_client(api.clone()).await;
    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    client.subscribe("x", "1", json!({})).await.unwrap();
    client.subscribe("y", "2", json!({})).await.unwrap();

    let cleanup = client.disconnect();
    assert_eq!(expect_close(&mut peer).await, 1000);
    cleanup.await.unwrap();

    let mut deleted = api.deleted();
    deleted.sort();
    assert_eq!(deleted, vec!["sub-1".to_string(), "sub-2".to_string()]);
    assert!(client.session().is_none());
    assert!(!client.is_connected());

    // Second teardown is a no-op.
    client.disconnect().await.unwrap();
    assert_eq!(api.deleted().len(), 2);
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_time_boxed() {
    let api = RecordingApi::with_delete_delay(Duration::from_secs(30));
    let (mut client, _connector, peer) = connected_client(api.clone()).await;
    peer.send_text(common::welcome_frame("m1", "s1", 10));
    common::settle_eventsub(&mut client).await;
    for topic in ["a", "b", "c", "d"] {
        client.subscribe(topic, "1", json!({})).await.unwrap();
    }

    let start = tokio::time::Instant::now();
    client.disconnect().await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(6));
    assert!(api.deleted().is_empty());
}

// ---- Activity gate ----

#[tokio::test(start_paused = true)]
async fn gate_connects_and_disconnects() {
    let api = RecordingApi::new();
    let (registry, connector) = common::create_test_registry();
    let client = EventSubClient::new(registry, api, &common::create_test_config());
    let gate = ActivityGate::new(["dashboard"]);
    let rx = gate.subscribe();

    let task = tokio::spawn(async move {
        let mut client = client;
        run_gated(&mut client, rx).await;
    });

    gate.set_screen("dashboard");
    let mut peer = connector.next_peer().await.expect("gate did not connect");
    peer.send_text(common::welcome_frame("m1", "s1", 10));

    gate.set_screen("settings");
    assert_eq!(expect_close(&mut peer).await, 1000);

    drop(gate);
    task.await.unwrap();
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn state_events_pass_through() {
    let api = RecordingApi::new();
    let (registry, connector) = common::create_test_registry();
    let mut client = EventSubClient::new(registry, api, &common::create_test_config());
    client.connect().await;
    let _peer = connector.next_peer().await.unwrap();
    let mut saw_open = false;
    while let Ok(Some(input)) =
        tokio::time::timeout(Duration::from_millis(50), client.next_event()).await
    {
        if input == EventSubInput::Socket(SocketEvent::State(lw_socket::ConnectionState::Open)) {
            saw_open = true;
        }
        client.handle_event(input).await;
    }
    assert!(saw_open);
    assert!(client.state().is_open());
}
