//! Integration tests for `PriceFeedManager` against a local WebSocket server.
//!
//! # Running
//!
//! ```sh
//! cargo test --test manager -- --nocapture
//! ```
//!
//! Every test binds its own server on `127.0.0.1:0`; no network access or
//! credentials are needed.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{FIRST_SUBSCRIPTION_ID, MockServer, price_notification, wait_until};
use oracle_feed_rs::error::FeedError;
use oracle_feed_rs::types::{Commitment, ConnectionStatus, Encoding, SubscribeParams};
use oracle_feed_rs::ws::manager::{FeedMessage, PriceFeedManager, PriceFeedManagerBuilder};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(250);

fn manager_for(server: &MockServer) -> PriceFeedManagerBuilder {
    PriceFeedManagerBuilder::new(server.url())
        .reconnect_delay_ms(20)
        .max_reconnect_attempts(3)
}

/// Collects every dispatched message.
fn record_messages(manager: &PriceFeedManager) -> Arc<Mutex<Vec<FeedMessage>>> {
    let seen: Arc<Mutex<Vec<FeedMessage>>> = Arc::default();
    let sink = seen.clone();
    manager.on_message(move |msg| sink.lock().unwrap().push(msg.clone()));
    seen
}

// ===================================================================
// Connect
// ===================================================================

#[tokio::test]
async fn test_concurrent_connects_share_one_socket() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();
    let mut status = manager.status_changes();

    let (a, b, c) = tokio::join!(manager.connect(), manager.connect(), manager.connect());
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert!(manager.is_connected());
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connected);

    manager.connect().await.unwrap();
    assert_eq!(server.accept_count(), 1);
    assert_eq!(manager.last_error(), None);
}

#[tokio::test]
async fn test_first_connect_failure_is_returned_without_retry() {
    let server = MockServer::start().await;
    server.refuse_connections(true);
    let manager = manager_for(&server).build();

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, FeedError::WebSocket(_)), "unexpected {err:?}");
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert!(manager.last_error().is_some());

    tokio::time::sleep(QUIET).await;
    assert_eq!(server.accept_count(), 1);
}

// ===================================================================
// Subscribe / acknowledge / notify
// ===================================================================

#[tokio::test]
async fn test_subscribe_resolves_on_ack_and_routes_notifications() {
    let server = MockServer::start_manual().await;
    let manager = Arc::new(manager_for(&server).build());
    let seen = record_messages(&manager);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.subscribe("A", SubscribeParams::default()).await })
    };

    let request = server.next_request().await;
    assert_eq!(request["method"], "accountSubscribe");
    assert_eq!(
        request["params"],
        json!(["A", {"encoding": "base64", "commitment": "confirmed"}])
    );
    let subscription = manager.subscriptions().await;
    assert_eq!(subscription.len(), 1);
    assert_eq!(subscription[0].pending_request, request["id"].as_u64());
    assert_eq!(subscription[0].subscription_id, None);

    server
        .send(json!({"jsonrpc": "2.0", "id": request["id"], "result": 777}))
        .await;
    assert_eq!(pending.await.unwrap().unwrap(), 777);

    let subscription = manager.subscriptions().await;
    assert_eq!(subscription[0].subscription_id, Some(777));
    assert_eq!(subscription[0].pending_request, None);

    server.send(price_notification(777, 6_512_345, 250, -2)).await;
    wait_until(WAIT, "price notification", || {
        seen.lock().unwrap().iter().any(|m| m.reading.is_some())
    })
    .await;

    let seen = seen.lock().unwrap();
    let notification = seen.iter().find(|m| m.reading.is_some()).unwrap();
    assert_eq!(notification.address.as_deref(), Some("A"));
    let reading = notification.reading.as_ref().unwrap();
    assert_eq!(reading.raw_price(), 6_512_345);
    assert!((reading.price() - 65_123.45).abs() < 1e-9);
    assert!((reading.confidence() - 2.5).abs() < 1e-12);
}

#[tokio::test]
async fn test_subscribe_sends_requested_params() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();

    let params = SubscribeParams::new(Encoding::Base64, Commitment::Finalized);
    let id = manager.subscribe("A", params).await.unwrap();
    assert_eq!(id, FIRST_SUBSCRIPTION_ID);

    let request = server.next_request().await;
    assert_eq!(request["params"][1]["commitment"], "finalized");
}

#[tokio::test]
async fn test_rpc_error_rejects_subscribe() {
    let server = MockServer::start_manual().await;
    let manager = Arc::new(manager_for(&server).build());

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.subscribe("A", SubscribeParams::default()).await })
    };
    let request = server.next_request().await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32602, "message": "Invalid param: WrongSize"}
        }))
        .await;

    match pending.await.unwrap() {
        Err(FeedError::Rpc { code, message }) => {
            assert_eq!(code, -32602);
            assert!(message.contains("WrongSize"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(manager.subscription_count().await, 0);
}

#[tokio::test]
async fn test_empty_address_is_rejected_before_connecting() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();

    let err = manager
        .subscribe("", SubscribeParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::InvalidArgument(_)));
    assert_eq!(server.accept_count(), 0);
}

#[tokio::test]
async fn test_subscribe_timeout_keeps_registry_entry() {
    let server = MockServer::start_manual().await;
    let manager = manager_for(&server).subscribe_timeout_ms(100).build();

    let err = manager
        .subscribe("A", SubscribeParams::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, FeedError::SubscribeTimeout { ref address, timeout_ms: 100 } if address == "A"),
        "unexpected {err:?}"
    );
    assert_eq!(manager.subscription_count().await, 1);

    // a late acknowledgment still confirms the entry
    let request = server.next_request().await;
    server
        .send(json!({"jsonrpc": "2.0", "id": request["id"], "result": 5}))
        .await;
    let mut confirmed = None;
    for _ in 0..100 {
        confirmed = manager.subscriptions().await[0].subscription_id;
        if confirmed.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(confirmed, Some(5));
}

// ===================================================================
// Unsubscribe
// ===================================================================

#[tokio::test]
async fn test_unsubscribe_unknown_address_sends_nothing() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();
    manager.connect().await.unwrap();

    manager.unsubscribe("never-subscribed").await.unwrap();
    assert!(server.try_next_request(QUIET).await.is_none());
}

#[tokio::test]
async fn test_unsubscribe_sends_confirmed_id_and_forgets_address() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();

    let id = manager.subscribe("A", SubscribeParams::default()).await.unwrap();
    let _subscribe = server.next_request().await;

    manager.unsubscribe("A").await.unwrap();
    let request = server.next_request().await;
    assert_eq!(request["method"], "accountUnsubscribe");
    assert_eq!(request["params"], json!([id]));
    assert_eq!(manager.subscription_count().await, 0);

    // second call is a no-op
    manager.unsubscribe("A").await.unwrap();
    assert!(server.try_next_request(QUIET).await.is_none());
}

// ===================================================================
// Reconnect
// ===================================================================

#[tokio::test]
async fn test_reconnect_resubscribes_only_registered_addresses() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();

    manager.subscribe("A", SubscribeParams::default()).await.unwrap();
    manager.subscribe("B", SubscribeParams::default()).await.unwrap();
    manager.unsubscribe("B").await.unwrap();
    for _ in 0..3 {
        server.next_request().await;
    }

    server.close_connection().await;
    wait_until(WAIT, "second handshake", || server.handshake_count() == 2).await;

    let request = server.next_request().await;
    assert_eq!(request["method"], "accountSubscribe");
    assert_eq!(request["params"][0], "A");
    assert!(server.try_next_request(QUIET).await.is_none());

    // the old confirmed id is replaced by the new acknowledgment
    let subs = manager.subscriptions().await;
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].subscription_id, Some(FIRST_SUBSCRIPTION_ID + 2));
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_reconnect_reissues_original_params() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();

    let params = SubscribeParams::new(Encoding::JsonParsed, Commitment::Finalized);
    manager.subscribe("A", params).await.unwrap();
    server.next_request().await;

    server.close_connection().await;
    wait_until(WAIT, "second handshake", || server.handshake_count() == 2).await;

    let request = server.next_request().await;
    assert_eq!(request["method"], "accountSubscribe");
    assert_eq!(
        request["params"],
        json!(["A", {"encoding": "jsonParsed", "commitment": "finalized"}])
    );
    assert_eq!(manager.subscriptions().await[0].params, params);
}

#[tokio::test]
async fn test_reconnect_attempts_are_spaced_by_delay() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).reconnect_delay_ms(300).build();
    manager.connect().await.unwrap();

    server.refuse_connections(true);
    let closed_at = tokio::time::Instant::now();
    server.close_connection().await;

    wait_until(WAIT, "all reconnect attempts", || server.accept_count() == 1 + 3).await;
    let accepts = server.accept_times();
    assert!(accepts[1] - closed_at >= Duration::from_millis(290));
    for pair in accepts[1..].windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(290) && gap < Duration::from_millis(1_500),
            "unexpected gap between attempts: {gap:?}"
        );
    }
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();
    manager.connect().await.unwrap();

    server.refuse_connections(true);
    server.close_connection().await;

    wait_until(WAIT, "reconnect budget exhausted", || {
        manager
            .last_error()
            .is_some_and(|e| e.contains("exhausted"))
    })
    .await;
    assert_eq!(server.accept_count(), 1 + 3);
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    tokio::time::sleep(QUIET).await;
    assert_eq!(server.accept_count(), 1 + 3);

    // an explicit connect starts over
    server.refuse_connections(false);
    manager.connect().await.unwrap();
    assert!(manager.is_connected());
    assert_eq!(manager.last_error(), None);
}

// ===================================================================
// Disconnect
// ===================================================================

#[tokio::test]
async fn test_disconnect_clears_state_and_suppresses_reconnect() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();
    manager.subscribe("A", SubscribeParams::default()).await.unwrap();

    manager.disconnect().await.unwrap();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(manager.subscription_count().await, 0);

    tokio::time::sleep(QUIET).await;
    assert_eq!(server.accept_count(), 1);

    // nothing is sent while disconnected
    manager.unsubscribe("A").await.unwrap();
    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_during_connect_aborts_attempt() {
    let server = MockServer::start().await;
    server.delay_handshakes(Duration::from_millis(200));
    let manager = Arc::new(manager_for(&server).build());

    let attempt = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect().await })
    };
    wait_until(WAIT, "TCP accept", || server.accept_count() == 1).await;
    assert_eq!(manager.status(), ConnectionStatus::Connecting);
    manager.disconnect().await.unwrap();

    match attempt.await.unwrap() {
        Err(FeedError::ConnectionAborted) => {}
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    // the late handshake is discarded and never revives the connection
    tokio::time::sleep(QUIET).await;
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(server.accept_count(), 1);
    assert!(server.try_next_request(QUIET).await.is_none());
}

#[tokio::test]
async fn test_disconnect_drops_throttled_price_update() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).throttle_interval_ms(1_000).build();
    let seen = record_messages(&manager);

    let delivered: Arc<Mutex<Vec<i64>>> = Arc::default();
    let sink = delivered.clone();
    let _updates = manager.on_price_update("A", move |reading| {
        sink.lock().unwrap().push(reading.raw_price());
    });

    let id = manager.subscribe("A", SubscribeParams::default()).await.unwrap();
    server.send(price_notification(id, 1, 0, 0)).await;
    server.send(price_notification(id, 2, 0, 0)).await;
    wait_until(WAIT, "both readings dispatched", || {
        seen.lock().unwrap().iter().filter(|m| m.reading.is_some()).count() == 2
    })
    .await;

    manager.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    assert!(!delivered.lock().unwrap().contains(&2));
}

#[tokio::test]
async fn test_disconnect_cancels_pending_subscribe() {
    let server = MockServer::start_manual().await;
    let manager = Arc::new(manager_for(&server).build());

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.subscribe("A", SubscribeParams::default()).await })
    };
    server.next_request().await;
    manager.disconnect().await.unwrap();

    match pending.await.unwrap() {
        Err(FeedError::SubscriptionCancelled(address)) => assert_eq!(address, "A"),
        other => panic!("unexpected {other:?}"),
    }
}

// ===================================================================
// Handlers
// ===================================================================

#[tokio::test]
async fn test_panicking_handler_does_not_block_others() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();

    let _bad = manager.on_message(|_| panic!("handler failure"));
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let _good = manager.on_message(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    manager.connect().await.unwrap();
    let frame = json!({"jsonrpc": "2.0", "method": "slotNotification", "params": {"result": {}}});
    server.send(frame.clone()).await;
    server.send(frame).await;

    wait_until(WAIT, "both frames", || hits.load(Ordering::SeqCst) == 2).await;
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();
    let seen = record_messages(&manager);

    manager.connect().await.unwrap();
    server.send_raw("{not json").await;
    server.send(json!({"jsonrpc": "2.0", "id": 99, "result": true})).await;

    wait_until(WAIT, "valid frame", || !seen.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].envelope.id, Some(99));
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_removed_handler_stops_receiving() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).build();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let registration = manager.on_message(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    let seen = record_messages(&manager);
    assert_eq!(manager.handler_count(), 2);

    manager.connect().await.unwrap();
    assert!(registration.remove());
    assert!(!registration.remove());
    server.send(json!({"jsonrpc": "2.0", "id": 1, "result": 0})).await;

    wait_until(WAIT, "frame", || !seen.lock().unwrap().is_empty()).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(manager.handler_count(), 1);
}

#[tokio::test]
async fn test_price_updates_are_throttled_per_address() {
    let server = MockServer::start().await;
    let manager = manager_for(&server).throttle_interval_ms(200).build();

    let delivered: Arc<Mutex<Vec<i64>>> = Arc::default();
    let sink = delivered.clone();
    let _updates = manager.on_price_update("A", move |reading| {
        sink.lock().unwrap().push(reading.raw_price());
    });

    let id = manager.subscribe("A", SubscribeParams::default()).await.unwrap();
    server.send(price_notification(id, 1, 0, 0)).await;
    server.send(price_notification(id, 2, 0, 0)).await;
    server.send(price_notification(id, 3, 0, 0)).await;
    // unknown subscription: never routed to "A"
    server.send(price_notification(id + 50, 4, 0, 0)).await;

    wait_until(WAIT, "latest reading", || {
        delivered.lock().unwrap().last() == Some(&3)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let delivered = delivered.lock().unwrap();
    assert!(delivered.len() <= 2, "burst not coalesced: {delivered:?}");
    assert_eq!(delivered.last(), Some(&3));
    assert!(!delivered.contains(&4));
}
