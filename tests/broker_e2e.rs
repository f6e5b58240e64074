use std::sync::Arc;
use std::time::Duration;

use merx::{
    Aggregation, Broker, BrokerConfig, ChannelEgress, ChannelHeartbeats, Condition,
    ControlRequest, Event, EventPayload, MessageKind, MessagePayload, NotificationBody,
    NullHeartbeats, Operator, Purchase, Subscription, UserRating, WindowConfig,
};

fn purchase(event_id: &str, category: &str, price: f64) -> Event {
    Event {
        event_id: event_id.to_string(),
        timestamp_ms: merx::now_ms(),
        payload: EventPayload::Purchase(Purchase {
            user_id: "user_1".to_string(),
            product_id: "prod_1".to_string(),
            category: category.to_string(),
            price,
            quantity: 1,
            warehouse_id: "wh_1".to_string(),
        }),
    }
}

fn rating(category: &str, value: f64) -> Event {
    Event {
        event_id: "evt_rating".to_string(),
        timestamp_ms: merx::now_ms(),
        payload: EventPayload::UserRating(UserRating {
            user_id: "user_1".to_string(),
            product_id: "prod_1".to_string(),
            category: category.to_string(),
            rating: value,
            review_text: String::new(),
        }),
    }
}

/// Polls `predicate` until it holds or the deadline passes.
fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

#[test]
fn subscribe_publish_notify_unsubscribe() {
    let (egress, notifications) = ChannelEgress::bounded(64);
    let broker = Broker::start(
        BrokerConfig::default(),
        Arc::new(egress),
        Arc::new(NullHeartbeats),
    )
    .unwrap();

    let subscription = Subscription::simple(
        "sub_s1",
        "subscriber_a",
        vec![Condition::new("category", Operator::Equal, "Electronics")],
    );
    let response = broker
        .control(ControlRequest::subscribe(&subscription, "tcp://localhost:6001").unwrap())
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.message.as_deref(), Some("Subscription sub_s1 added"));

    broker.publish(purchase("evt_1", "Electronics", 750.0));

    let (topic, message) = notifications.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(topic, "subscriber_a");
    assert_eq!(message.kind(), MessageKind::Notification);
    assert!(message.message_id.starts_with("broker_msg_"));
    let MessagePayload::Notification(notification) = &message.payload else {
        panic!("expected notification payload, got {:?}", message.payload);
    };
    assert!(notification.notification_id.starts_with("notif_"));
    assert!(notification.notification_id.ends_with("_sub_s1"));
    assert_eq!(notification.subscription_id, "sub_s1");
    assert_eq!(notification.subscriber_id, "subscriber_a");
    let NotificationBody::Simple { matched_event } = &notification.body else {
        panic!("expected simple body, got {:?}", notification.body);
    };
    assert_eq!(matched_event.event_id, "evt_1");

    // Non-matching category: no notification.
    broker.publish(purchase("evt_2", "Clothing", 750.0));
    assert!(notifications.recv_timeout(Duration::from_millis(200)).is_err());

    // Unsubscribe; the reply guarantees the registry changed before the
    // next publish is matched.
    let response = broker
        .control(ControlRequest::Unsubscribe {
            subscription_id: "sub_s1".to_string(),
        })
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.message.as_deref(), Some("Subscription sub_s1 removed"));

    broker.publish(purchase("evt_3", "Electronics", 750.0));
    assert!(notifications.recv_timeout(Duration::from_millis(200)).is_err());

    assert!(wait_until(Duration::from_secs(2), || {
        broker.statistics().events_processed == 3
    }));
    let response = broker.control(ControlRequest::Status).unwrap();
    let report = response.statistics.unwrap();
    assert_eq!(report.subscriptions.total_subscriptions, 0);
    assert_eq!(report.events_processed, 3);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.notifications_dropped, 0);
    assert!(report.uptime_seconds >= 0.0);

    broker.stop();
}

#[test]
fn windowed_subscription_fires_once_per_gated_window() {
    let (egress, notifications) = ChannelEgress::bounded(64);
    let broker = Broker::start(
        BrokerConfig::default(),
        Arc::new(egress),
        Arc::new(NullHeartbeats),
    )
    .unwrap();

    let subscription = Subscription::complex(
        "sub_window",
        "subscriber_b",
        vec![
            Condition::new("category", Operator::Equal, "Electronics"),
            Condition::windowed("avg_rating", Operator::GreaterThan, "3.0"),
        ],
        WindowConfig::new(5, Aggregation::Avg),
    );
    broker
        .control(ControlRequest::subscribe(&subscription, "tcp://localhost:6002").unwrap())
        .unwrap();

    // Gated events never sample the window.
    for _ in 0..5 {
        broker.publish(rating("Clothing", 5.0));
    }
    // A full window whose aggregate misses the threshold stays silent.
    for _ in 0..5 {
        broker.publish(rating("Electronics", 1.0));
    }
    assert!(notifications.recv_timeout(Duration::from_millis(300)).is_err());

    // A passing window fires exactly once.
    for value in [4.0, 4.1, 4.2, 4.3, 4.4] {
        broker.publish(rating("Electronics", value));
    }
    let (topic, message) = notifications.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(topic, "subscriber_b");
    let MessagePayload::Notification(notification) = &message.payload else {
        panic!("expected notification payload");
    };
    assert!(notification.notification_id.starts_with("complex_notif_"));
    let NotificationBody::Complex {
        category,
        field_name,
        aggregated_value,
        window_size,
        condition_met,
    } = &notification.body
    else {
        panic!("expected complex body, got {:?}", notification.body);
    };
    assert_eq!(category, "Electronics");
    assert_eq!(field_name, "avg_rating");
    assert!((aggregated_value - 4.2).abs() < 1e-9);
    assert_eq!(*window_size, 5);
    assert!(condition_met);

    // The tumbled window starts empty: one more sample cannot fire.
    broker.publish(rating("Electronics", 5.0));
    assert!(notifications.recv_timeout(Duration::from_millis(200)).is_err());

    broker.stop();
}

#[test]
fn control_frames_follow_the_wire_protocol() {
    let (egress, _notifications) = ChannelEgress::bounded(8);
    let broker = Broker::start(
        BrokerConfig::default(),
        Arc::new(egress),
        Arc::new(NullHeartbeats),
    )
    .unwrap();

    let subscription = Subscription::simple(
        "sub_frame",
        "subscriber_c",
        vec![Condition::new("category", Operator::Equal, "Books")],
    );
    let frame = ControlRequest::subscribe(&subscription, "tcp://localhost:6003")
        .unwrap()
        .to_bytes()
        .unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&broker.control_frame(&frame)).unwrap();
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["message"], "Subscription sub_frame added");

    let reply: serde_json::Value =
        serde_json::from_slice(&broker.control_frame(br#"{"type":"promote"}"#)).unwrap();
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "Unknown request type");

    let reply: serde_json::Value =
        serde_json::from_slice(&broker.control_frame(b"{not json")).unwrap();
    assert_eq!(reply["status"], "error");

    // Structurally invalid subscription: rejected, registry unchanged.
    let invalid = Subscription::simple("sub_invalid", "subscriber_c", Vec::new());
    let frame = ControlRequest::subscribe(&invalid, "tcp://localhost:6003")
        .unwrap()
        .to_bytes()
        .unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&broker.control_frame(&frame)).unwrap();
    assert_eq!(reply["status"], "error");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .contains("empty conditions list"));

    let status = broker.control(ControlRequest::Status).unwrap();
    assert_eq!(status.statistics.unwrap().subscriptions.total_subscriptions, 1);

    broker.stop();
}

#[test]
fn egress_backpressure_increments_dropped_notifications() {
    // One-slot egress that nobody drains.
    let (egress, egress_rx) = ChannelEgress::bounded(1);
    let broker = Broker::start(
        BrokerConfig::default(),
        Arc::new(egress),
        Arc::new(NullHeartbeats),
    )
    .unwrap();

    let subscription = Subscription::simple(
        "sub_slow",
        "slow_subscriber",
        vec![Condition::new("category", Operator::Equal, "Electronics")],
    );
    broker
        .control(ControlRequest::subscribe(&subscription, "tcp://localhost:6004").unwrap())
        .unwrap();

    for i in 0..50 {
        broker.publish(purchase(&format!("evt_{i}"), "Electronics", 10.0));
    }

    assert!(wait_until(Duration::from_secs(2), || {
        broker.statistics().notifications_dropped > 0
    }));
    let stats = broker.statistics();
    assert!(stats.notifications_sent >= 1);
    assert!(stats.notifications_dropped > 0);

    // Keep the receiver alive so drops came from saturation, not disconnect.
    drop(egress_rx);
    broker.stop();
}

#[test]
fn heartbeats_report_registry_and_progress() {
    let (egress, _notifications) = ChannelEgress::bounded(8);
    let (heartbeats, heartbeat_rx) = ChannelHeartbeats::bounded(16);
    let config = BrokerConfig {
        broker_id: "broker_hb".to_string(),
        heartbeat_interval: Duration::from_millis(50),
        ..BrokerConfig::default()
    };
    let broker = Broker::start(config, Arc::new(egress), Arc::new(heartbeats)).unwrap();

    let subscription = Subscription::simple(
        "sub_hb",
        "subscriber_d",
        vec![Condition::new("category", Operator::Equal, "Books")],
    );
    broker
        .control(ControlRequest::subscribe(&subscription, "tcp://localhost:6005").unwrap())
        .unwrap();

    // Early beats may predate the registration; wait for one that saw it.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    let heartbeat = loop {
        let heartbeat = heartbeat_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("expected heartbeats on a 50ms cadence");
        if heartbeat.active_subscriptions == 1 {
            break heartbeat;
        }
        assert!(std::time::Instant::now() < deadline, "heartbeat never saw the registration");
    };
    assert_eq!(heartbeat.broker_id, "broker_hb");
    assert_eq!(heartbeat.status, "healthy");

    broker.stop();
}

#[test]
fn stop_is_idempotent_and_quiets_intake() {
    let (egress, _notifications) = ChannelEgress::bounded(8);
    let broker = Broker::start(
        BrokerConfig::default(),
        Arc::new(egress),
        Arc::new(NullHeartbeats),
    )
    .unwrap();

    broker.stop();
    broker.stop();

    // Intake after stop is counted, not crashed.
    broker.publish(purchase("evt_late", "Electronics", 1.0));
    assert!(broker.statistics().events_dropped >= 1);

    // The control plane reports the disconnect instead of hanging.
    let err = broker.control(ControlRequest::Status).unwrap_err();
    assert!(matches!(
        err,
        merx::MerxError::Execution(merx::ExecutionError::Disconnected { .. })
    ));
}
